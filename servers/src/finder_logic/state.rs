use lib_finder::RefreshCoordinator;
use std::sync::Arc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: RefreshCoordinator,
    // None when the service runs open
    api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(engine: RefreshCoordinator, api_key: Option<&str>) -> Self {
        Self {
            engine,
            api_key: api_key.map(Arc::from),
        }
    }

    pub fn is_open(&self) -> bool {
        self.api_key.is_none()
    }

    /// Whether `presented` grants access to guarded routes.
    pub fn key_matches(&self, presented: Option<&str>) -> bool {
        match (&self.api_key, presented) {
            (None, _) => true,
            (Some(expected), Some(given)) => expected.as_ref() == given,
            (Some(_), None) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_finder::{DiscoveryConfig, GamesApiOptions, GamesApiSource};

    fn engine() -> RefreshCoordinator {
        let source = GamesApiSource::new(&GamesApiOptions::default()).unwrap();
        RefreshCoordinator::new(Arc::new(source), DiscoveryConfig::default())
    }

    #[test]
    fn test_open_service_accepts_anything() {
        let state = AppState::new(engine(), None);
        assert!(state.is_open());
        assert!(state.key_matches(None));
        assert!(state.key_matches(Some("whatever")));
    }

    #[test]
    fn test_guarded_service_requires_exact_key() {
        let state = AppState::new(engine(), Some("s3cret"));
        assert!(!state.is_open());
        assert!(state.key_matches(Some("s3cret")));
        assert!(!state.key_matches(Some("S3CRET")));
        assert!(!state.key_matches(None));
    }
}
