#![forbid(unsafe_code)]

//! The rendering side of a component binding.

/// Receives re-render requests from a mounted [`ComponentScope`](crate::ComponentScope).
///
/// A request is a hint: the host decides when to call
/// [`render`](crate::ComponentScope::render) again. Several notifications
/// before the next render may produce several requests.
pub trait RenderHost {
    /// Schedule a re-render of the component.
    fn request_render(&self);
}

impl<F: Fn()> RenderHost for F {
    fn request_render(&self) {
        self();
    }
}
