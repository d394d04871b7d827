//! Late-bound references between resources.
//!
//! A [`CrossStackRef`] is handed from the stack that produces a resource
//! to the constructor of the stack that consumes it. It carries only the
//! producing stack and the logical ID; the synthesizer resolves it to a
//! physical identifier in a second pass, so stacks can be declared in any
//! order.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use stackline_common::types::{LogicalId, StackId};

/// Untyped address of a resource: owning stack plus logical ID.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Stack that declares the resource.
    pub stack: StackId,
    /// Logical ID of the resource inside that stack.
    pub logical_id: LogicalId,
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stack, self.logical_id)
    }
}

/// Typed handle to a resource of kind `T` owned by another stack.
pub struct CrossStackRef<T> {
    target: ResourceRef,
    _kind: PhantomData<fn() -> T>,
}

impl<T> CrossStackRef<T> {
    /// Creates a handle to `logical_id` in `stack`.
    #[must_use]
    pub const fn new(stack: StackId, logical_id: LogicalId) -> Self {
        Self {
            target: ResourceRef { stack, logical_id },
            _kind: PhantomData,
        }
    }

    /// Producing stack.
    #[must_use]
    pub const fn stack(&self) -> &StackId {
        &self.target.stack
    }

    /// Logical ID inside the producing stack.
    #[must_use]
    pub const fn logical_id(&self) -> &LogicalId {
        &self.target.logical_id
    }

    /// Erases the resource kind.
    #[must_use]
    pub const fn target(&self) -> &ResourceRef {
        &self.target
    }
}

impl<T> Clone for CrossStackRef<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            _kind: PhantomData,
        }
    }
}

impl<T> PartialEq for CrossStackRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

impl<T> Eq for CrossStackRef<T> {}

impl<T> fmt::Debug for CrossStackRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossStackRef")
            .field("stack", &self.target.stack)
            .field("logical_id", &self.target.logical_id)
            .finish()
    }
}

impl<T> From<&CrossStackRef<T>> for ResourceRef {
    fn from(handle: &CrossStackRef<T>) -> Self {
        handle.target.clone()
    }
}

const TOKEN_OPEN: &str = "${";
const TOKEN_CLOSE: &str = ".Name}";

/// Placeholder for the physical name of a resource in the same stack.
///
/// Physical names are only known after synthesis; attribute strings embed
/// this token and the synthesizer substitutes it with
/// [`render_name_tokens`].
#[must_use]
pub fn name_token(id: &LogicalId) -> String {
    format!("{TOKEN_OPEN}{id}{TOKEN_CLOSE}")
}

/// Replaces every name token in `input` using `lookup`.
///
/// Tokens whose logical ID `lookup` does not know are returned as `Err`
/// with that ID.
///
/// # Errors
///
/// Returns the first unresolved logical ID.
pub fn render_name_tokens<F>(input: &str, lookup: F) -> Result<String, LogicalId>
where
    F: Fn(&LogicalId) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find(TOKEN_OPEN) {
        let after_open = &rest[start + TOKEN_OPEN.len()..];
        let Some(end) = after_open.find(TOKEN_CLOSE) else {
            break;
        };
        let id = LogicalId::new(&after_open[..end]);
        let name = lookup(&id).ok_or_else(|| id.clone())?;
        out.push_str(&rest[..start]);
        out.push_str(&name);
        rest = &after_open[end + TOKEN_CLOSE.len()..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;

    #[test]
    fn handle_exposes_target() {
        let handle: CrossStackRef<Marker> =
            CrossStackRef::new(StackId::new("ECRStack"), LogicalId::new("Repo1"));
        assert_eq!(handle.stack().as_str(), "ECRStack");
        assert_eq!(handle.logical_id().as_str(), "Repo1");
        let erased: ResourceRef = (&handle).into();
        assert_eq!(erased.to_string(), "ECRStack/Repo1");
    }

    #[test]
    fn handle_clone_compares_equal() {
        let handle: CrossStackRef<Marker> =
            CrossStackRef::new(StackId::new("A"), LogicalId::new("X"));
        assert_eq!(handle.clone(), handle);
    }

    #[test]
    fn render_replaces_known_tokens() {
        let id = LogicalId::new("AppLogs12AB34CD");
        let input = format!("service.name=svc,aws.log.group.names={}", name_token(&id));
        let rendered = render_name_tokens(&input, |_| Some("app-logs".into())).expect("render");
        assert_eq!(rendered, "service.name=svc,aws.log.group.names=app-logs");
    }

    #[test]
    fn render_reports_unknown_token() {
        let id = LogicalId::new("Missing");
        let err = render_name_tokens(&name_token(&id), |_| None).unwrap_err();
        assert_eq!(err, id);
    }

    #[test]
    fn render_leaves_plain_strings_alone() {
        let rendered = render_name_tokens("no tokens ${here", |_| None).expect("render");
        assert_eq!(rendered, "no tokens ${here");
    }
}
