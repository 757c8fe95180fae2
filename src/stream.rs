//! Owned and borrowed stream handles.

use std::cell::{RefCell, RefMut};
use std::rc::{Rc, Weak};

use crate::error::{Error, Result};

/// A stream that can be shared between readers and writers on one thread.
pub type SharedStream<S> = Rc<RefCell<S>>;

/// The stream a reader or writer operates on.
///
/// An owning handle holds a strong reference that keeps the stream alive, and drops it when the
/// handle is dropped or re-assigned. Ownership is not exclusive: a caller that kept its own `Rc`
/// keeps the stream alive past that point.
/// A borrowed handle only observes the stream; once every owner is gone, accessing it fails with
/// `Error::Detached`.
pub(crate) enum StreamHandle<S> {
    Detached,
    Owned(Rc<RefCell<S>>),
    Borrowed(Weak<RefCell<S>>),
}

impl<S> StreamHandle<S> {
    pub(crate) fn new(stream: Option<SharedStream<S>>, take_ownership: bool) -> Self {
        match stream {
            None => Self::Detached,
            Some(stream) if take_ownership => Self::Owned(stream),
            Some(stream) => Self::Borrowed(Rc::downgrade(&stream)),
        }
    }

    /// Replaces the current target. The strong reference to a previously owned stream is dropped
    /// before the new handle is installed.
    pub(crate) fn set(&mut self, stream: Option<SharedStream<S>>, take_ownership: bool) {
        *self = Self::Detached;
        *self = Self::new(stream, take_ownership);
        tracing::trace!(
            owned = self.is_owned(),
            attached = !matches!(self, Self::Detached),
            "stream assigned"
        );
    }

    pub(crate) fn get(&self) -> Option<SharedStream<S>> {
        match self {
            Self::Detached => None,
            Self::Owned(stream) => Some(Rc::clone(stream)),
            Self::Borrowed(stream) => stream.upgrade(),
        }
    }

    pub(crate) fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }

    /// Returns the stream, or `Error::Detached` if there is none.
    pub(crate) fn require(&self) -> Result<SharedStream<S>> {
        self.get().ok_or(Error::Detached)
    }
}

/// Mutably borrows a shared stream, reporting a conflicting borrow as an error.
pub(crate) fn borrow_stream<S>(stream: &RefCell<S>) -> Result<RefMut<'_, S>> {
    stream.try_borrow_mut().map_err(|_| Error::StreamInUse)
}

/// Cloning never duplicates ownership: the copy always borrows.
impl<S> Clone for StreamHandle<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Detached => Self::Detached,
            Self::Owned(stream) => Self::Borrowed(Rc::downgrade(stream)),
            Self::Borrowed(stream) => Self::Borrowed(Weak::clone(stream)),
        }
    }
}

impl<S> Drop for StreamHandle<S> {
    fn drop(&mut self) {
        if let Self::Owned(_) = self {
            tracing::trace!("releasing owned stream");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn shared(bytes: &[u8]) -> SharedStream<Cursor<Vec<u8>>> {
        Rc::new(RefCell::new(Cursor::new(bytes.to_vec())))
    }

    #[test]
    fn clone_of_owner_borrows() {
        let handle = StreamHandle::new(Some(shared(&[1, 2])), true);
        let copy = handle.clone();
        assert!(handle.is_owned());
        assert!(!copy.is_owned());
        assert!(Rc::ptr_eq(&handle.get().unwrap(), &copy.get().unwrap()));
    }

    #[test]
    fn copy_detaches_when_owner_drops() {
        let handle = StreamHandle::new(Some(shared(&[1])), true);
        let copy = handle.clone();
        drop(handle);
        assert!(copy.get().is_none());
        assert!(matches!(copy.require(), Err(Error::Detached)));
    }

    #[test]
    fn set_releases_previous_owner() {
        let first = shared(&[1]);
        let weak = Rc::downgrade(&first);
        let mut handle = StreamHandle::new(Some(first), true);
        handle.set(Some(shared(&[2])), true);
        assert!(weak.upgrade().is_none());
        assert!(handle.is_owned());
    }

    #[test]
    fn owner_shares_with_outside_rc() {
        let first = shared(&[1]);
        let mut handle = StreamHandle::new(Some(Rc::clone(&first)), true);
        assert_eq!(Rc::strong_count(&first), 2);
        handle.set(None, true);
        assert_eq!(Rc::strong_count(&first), 1);
    }

    #[test]
    fn borrowed_stream_survives_handle() {
        let stream = shared(&[1]);
        let mut handle = StreamHandle::new(Some(Rc::clone(&stream)), false);
        assert!(!handle.is_owned());
        handle.set(None, true);
        assert!(matches!(handle, StreamHandle::Detached));
        assert_eq!(Rc::strong_count(&stream), 1);
    }

    #[test]
    fn conflicting_borrow_is_reported() {
        let stream = shared(&[1]);
        let _guard = stream.borrow_mut();
        assert!(matches!(borrow_stream(&stream), Err(Error::StreamInUse)));
    }
}
