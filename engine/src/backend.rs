//! Biometric backend capability.
//!
//! A backend builds a profiler during enrollment and a verifier afterwards.
//! Both hold native resources that must be released exactly once;
//! [`BackendHandle`] owns them and releases on drop if nobody did earlier.

use async_trait::async_trait;

use crate::error::BackendError;
use crate::frame::AudioFrame;

/// External voice-biometric engine.
#[async_trait]
pub trait BiometricBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Starts an enrollment.
    async fn create_profiler(
        &self,
        access_key: &str,
        model: Option<&str>,
    ) -> Result<Box<dyn Profiler>, BackendError>;

    /// Creates a verifier for the given exported profiles.
    async fn create_verifier(
        &self,
        access_key: &str,
        model: Option<&str>,
        profiles: &[Vec<u8>],
    ) -> Result<Box<dyn Verifier>, BackendError>;
}

/// Incremental enrollment handle.
#[async_trait]
pub trait Profiler: Send {
    /// Feeds one frame, returning the enrollment progress in percent.
    async fn enroll(&mut self, frame: &AudioFrame) -> Result<f32, BackendError>;

    /// Exports the profile built so far.
    async fn export(&mut self) -> Result<Vec<u8>, BackendError>;

    /// Frees native resources.
    fn release(&mut self);
}

/// Scores audio against enrolled profiles.
#[async_trait]
pub trait Verifier: Send {
    /// Returns one score per enrolled profile.
    async fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>, BackendError>;

    /// Frees native resources.
    fn release(&mut self);
}

/// Anything with a one-shot release.
pub trait Release {
    fn release(&mut self);
}

impl Release for dyn Profiler {
    fn release(&mut self) {
        Profiler::release(self)
    }
}

impl Release for dyn Verifier {
    fn release(&mut self) {
        Verifier::release(self)
    }
}

/// Owned backend resource, released exactly once.
pub struct BackendHandle<T: Release + ?Sized> {
    inner: Option<Box<T>>,
}

impl<T: Release + ?Sized> BackendHandle<T> {
    pub fn new(inner: Box<T>) -> Self {
        Self { inner: Some(inner) }
    }

    pub fn empty() -> Self {
        Self { inner: None }
    }

    pub fn is_live(&self) -> bool {
        self.inner.is_some()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.inner.as_deref_mut()
    }

    /// Releases the resource. Returns false if it was already gone.
    pub fn release(&mut self) -> bool {
        match self.inner.take() {
            Some(mut inner) => {
                Release::release(&mut *inner);
                true
            }
            None => false,
        }
    }
}

impl<T: Release + ?Sized> Drop for BackendHandle<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: Release + ?Sized> Default for BackendHandle<T> {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingVerifier(Arc<AtomicUsize>);

    #[async_trait]
    impl Verifier for CountingVerifier {
        async fn process(&mut self, _samples: &[f32]) -> Result<Vec<f32>, BackendError> {
            Ok(vec![1.0])
        }

        fn release(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn handle_releases_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut h: BackendHandle<dyn Verifier> =
            BackendHandle::new(Box::new(CountingVerifier(count.clone())));
        assert!(h.is_live());
        assert!(h.release());
        assert!(!h.release());
        drop(h);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let _h: BackendHandle<dyn Verifier> =
                BackendHandle::new(Box::new(CountingVerifier(count.clone())));
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_mut_reaches_inner() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut h: BackendHandle<dyn Verifier> =
            BackendHandle::new(Box::new(CountingVerifier(count)));
        let scores = h.get_mut().unwrap().process(&[0.0]).await.unwrap();
        assert_eq!(scores, vec![1.0]);
    }
}
