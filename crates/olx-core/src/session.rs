//! Network session: the engine, its lifetime epoch and the stored results.
//!
//! Every handle-bearing value captures a [`SessionToken`] when it is created
//! and presents it back before each operation. Opening, closing or replacing
//! the network bumps the epoch, so tokens taken earlier stop matching and the
//! operation fails with `StaleHandle` (or `SessionClosed` when nothing is open)
//! instead of touching a dangling handle.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use crate::config::OlxConfig;
use crate::engine::{self, Engine};
use crate::entity::GenericEntity;
use crate::error::{OlxError, OlxResult};
use crate::handle::Handle;
use crate::key::Key;
use crate::kind::EntityKind;
use crate::resolve::KeyResolver;
use crate::schema::SchemaRegistry;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of the network state a value was created against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken {
    session: u64,
    epoch: u64,
}

impl SessionToken {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Bookkeeping for the results held by the engine.
///
/// `generation` moves whenever a run clears earlier results; `count` is the
/// number of results currently addressable (1-based indices up to `count`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultBook {
    pub generation: u64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NetworkState {
    Closed,
    Open {
        path: Option<PathBuf>,
        read_only: bool,
    },
}

/// Owner of the engine and of all per-network mutable state.
pub struct Session {
    id: u64,
    epoch: u64,
    state: NetworkState,
    engine: Box<dyn Engine>,
    schema: SchemaRegistry,
    config: OlxConfig,
    results: ResultBook,
}

impl Session {
    /// Wrap an engine. No network is open until [`Session::open`] or
    /// [`Session::new_network`] succeeds.
    pub fn new(engine: Box<dyn Engine>, config: OlxConfig) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            epoch: 0,
            state: NetworkState::Closed,
            engine,
            schema: SchemaRegistry::builtin(),
            config,
            results: ResultBook::default(),
        }
    }

    pub fn open(&mut self, path: impl AsRef<Path>, read_only: bool) -> OlxResult<()> {
        let path = path.as_ref();
        self.advance_epoch();
        self.state = NetworkState::Closed;
        self.engine
            .open_network(path, read_only)
            .map_err(|_| self.engine_error(format!("open {}", path.display())))?;
        self.state = NetworkState::Open {
            path: Some(path.to_path_buf()),
            read_only,
        };
        info!(path = %path.display(), read_only, epoch = self.epoch, "network opened");
        Ok(())
    }

    /// Open using the configured read-only default.
    pub fn open_default(&mut self, path: impl AsRef<Path>) -> OlxResult<()> {
        let read_only = self.config.session.default_read_only;
        self.open(path, read_only)
    }

    pub fn close(&mut self) -> OlxResult<()> {
        self.ensure_open()?;
        self.advance_epoch();
        self.state = NetworkState::Closed;
        self.engine
            .close_network()
            .map_err(|_| self.engine_error("close network"))?;
        info!(epoch = self.epoch, "network closed");
        Ok(())
    }

    /// Replace the current network (if any) with an empty one.
    pub fn new_network(&mut self) -> OlxResult<()> {
        self.advance_epoch();
        self.state = NetworkState::Closed;
        self.engine
            .new_network()
            .map_err(|_| self.engine_error("new network"))?;
        self.state = NetworkState::Open {
            path: None,
            read_only: false,
        };
        info!(epoch = self.epoch, "empty network created");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, NetworkState::Open { .. })
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.state, NetworkState::Open { read_only: true, .. })
    }

    /// Path of the open network file; `None` for a closed or scratch network.
    pub fn path(&self) -> Option<&Path> {
        match &self.state {
            NetworkState::Open { path, .. } => path.as_deref(),
            NetworkState::Closed => None,
        }
    }

    pub fn token(&self) -> SessionToken {
        SessionToken {
            session: self.id,
            epoch: self.epoch,
        }
    }

    pub fn ensure_open(&self) -> OlxResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(OlxError::SessionClosed)
        }
    }

    /// Fail unless `token` was taken from this session in its current epoch.
    pub fn check(&self, token: SessionToken, kind: EntityKind) -> OlxResult<()> {
        self.ensure_open()?;
        if token != self.token() {
            return Err(OlxError::StaleHandle { kind });
        }
        Ok(())
    }

    /// Fail unless the result `index` of `generation` is still addressable.
    pub fn check_result(
        &self,
        token: SessionToken,
        generation: u64,
        index: usize,
    ) -> OlxResult<()> {
        self.ensure_open()?;
        let stale = |reason: String| OlxError::StaleResult { index, reason };
        if token != self.token() {
            return Err(stale("the network session has changed".into()));
        }
        if generation != self.results.generation {
            return Err(stale("results were cleared by a later run".into()));
        }
        if index == 0 || index > self.results.count {
            return Err(stale(format!(
                "index out of range ({} results stored)",
                self.results.count
            )));
        }
        Ok(())
    }

    pub fn results(&self) -> ResultBook {
        self.results
    }

    /// Account for `produced` new results. Returns the generation they belong
    /// to and the 1-based index of the first of them.
    pub fn record_results(&mut self, produced: usize, clear_previous: bool) -> (u64, usize) {
        if clear_previous {
            self.results.generation += 1;
            self.results.count = 0;
        }
        let first = self.results.count + 1;
        self.results.count += produced;
        debug!(
            generation = self.results.generation,
            first,
            produced,
            "results recorded"
        );
        (self.results.generation, first)
    }

    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> &mut dyn Engine {
        self.engine.as_mut()
    }

    /// Wrap the engine's last error for a failed `operation`.
    pub fn engine_error(&self, operation: impl Into<String>) -> OlxError {
        engine::failure(self.engine(), operation)
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    /// Register a user-defined string field on `kind`.
    pub fn extend_schema(&mut self, kind: EntityKind, name: &str) -> OlxResult<()> {
        self.schema.extend(kind, name)
    }

    pub fn config(&self) -> &OlxConfig {
        &self.config
    }

    /// Resolve `key` to an entity of `kind`.
    pub fn resolve(&self, kind: EntityKind, key: &Key) -> OlxResult<GenericEntity> {
        let resolved = KeyResolver::new(self).resolve(kind, key)?;
        Ok(GenericEntity::from_resolved(kind, resolved, self.token()))
    }

    /// [`Session::resolve`] on text classified by [`Key::parse`].
    pub fn resolve_str(&self, kind: EntityKind, text: &str) -> OlxResult<GenericEntity> {
        self.resolve(kind, &Key::parse(text))
    }

    /// Like [`Session::resolve`], but an absent object is `Ok(None)`.
    pub fn find(&self, kind: EntityKind, key: &Key) -> OlxResult<Option<GenericEntity>> {
        match self.resolve(kind, key) {
            Ok(entity) => Ok(Some(entity)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Every object of `kind` in the network. Split devices appear once.
    pub fn all(&self, kind: EntityKind) -> OlxResult<Vec<GenericEntity>> {
        self.ensure_open()?;
        let mut out: Vec<GenericEntity> = Vec::new();
        for handle in self.engine.enumerate_related(None, kind) {
            let entity = self.wrap(handle)?;
            if !out.iter().any(|seen| seen == &entity) {
                out.push(entity);
            }
        }
        Ok(out)
    }

    /// Wrap a handle returned by the engine, looking up its runtime kind.
    pub fn wrap(&self, handle: Handle) -> OlxResult<GenericEntity> {
        self.ensure_open()?;
        let kind = self.engine.kind_of(handle).ok_or_else(|| OlxError::NotFound {
            kind: EntityKind::Bus,
            key: handle.to_string(),
        })?;
        let resolved = KeyResolver::new(self).normalize(kind, handle);
        Ok(GenericEntity::from_resolved(kind, resolved, self.token()))
    }

    fn advance_epoch(&mut self) {
        self.epoch += 1;
        self.results = ResultBook {
            generation: self.results.generation + 1,
            count: 0,
        };
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.is_open() && self.engine.close_network().is_err() {
            warn!(
                message = %self.engine.last_error_message(),
                "engine failed to close the network on drop"
            );
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("epoch", &self.epoch)
            .field("state", &self.state)
            .field("results", &self.results)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_session, MockEngine, SAMPLE_PATH};

    #[test]
    fn test_lifecycle_bumps_epoch() {
        let mut session = sample_session().unwrap();
        let before = session.token();
        session.close().unwrap();
        assert!(!session.is_open());
        assert!(matches!(
            session.check(before, EntityKind::Bus),
            Err(OlxError::SessionClosed)
        ));
        session.open(SAMPLE_PATH, true).unwrap();
        assert!(session.is_read_only());
        assert!(matches!(
            session.check(before, EntityKind::Bus),
            Err(OlxError::StaleHandle { .. })
        ));
    }

    #[test]
    fn test_open_default_follows_config() {
        let mut config = OlxConfig::default();
        config.session.default_read_only = true;
        let mut session = Session::new(Box::new(MockEngine::sample()), config);
        session.open_default(SAMPLE_PATH).unwrap();
        assert!(session.is_open());
        assert!(session.is_read_only());
    }

    #[test]
    fn test_open_failure_leaves_session_closed() {
        let mut session = Session::new(Box::new(MockEngine::sample()), OlxConfig::default());
        let err = session.open("missing.olr", false).unwrap_err();
        assert!(matches!(err, OlxError::Engine { .. }));
        assert!(!session.is_open());
    }

    #[test]
    fn test_result_book_appends_or_clears() {
        let mut session = sample_session().unwrap();
        let (g1, first) = session.record_results(3, true);
        assert_eq!(first, 1);
        let (g2, next) = session.record_results(2, false);
        assert_eq!((g1, next), (g2, 4));
        let token = session.token();
        session.check_result(token, g1, 5).unwrap();
        session.record_results(1, true);
        assert!(session.check_result(token, g1, 1).is_err());
    }
}
