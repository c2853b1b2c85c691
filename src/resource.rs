//! The contract pooled resources fulfil

/// A reusable, expensive-to-create handle managed by a [`ResourcePool`](crate::ResourcePool).
///
/// The pool calls [`close`](Resource::close) exactly once per resource, when
/// the pool is torn down or when construction is rolled back. The default
/// implementation just drops the value.
///
/// # Examples
///
/// ```
/// use connpool::Resource;
///
/// struct Session {
///     id: usize,
/// }
///
/// impl Resource for Session {
///     fn close(self) {
///         println!("closing session {}", self.id);
///     }
/// }
/// ```
pub trait Resource: Sized + Send + 'static {
    /// Tear the resource down
    fn close(self) {}
}
