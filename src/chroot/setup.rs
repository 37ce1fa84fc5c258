//! Setup state machine
//!
//! Each phase runs as lock half, setup scripts, unlock half:
//!
//! ```text
//! (Start, lock)  -> scripts -> (Start, unlock)
//!   ... session in use ...
//! (Stop, lock)   -> scripts -> (Stop, unlock, status)
//! ```
//!
//! Storage facets decide what each half does. Device-backed chroots take the
//! device lock at `(Start, lock)` and drop it at `(Stop, unlock)`; session
//! metadata is written at the first call and removed at the last.

use crate::chroot::{Chroot, Environment};
use crate::config::types::{ChrootError, Result, SetupPhase};
use crate::observability::audit::{AuditEvent, AuditEventType};
use crate::observability::LogContext;
use crate::safety::lock::DEFAULT_DEVICE_LOCK_TIMEOUT;
use crate::safety::session_store::SessionStore;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LOCK_DIR: &str = "/run/chrootbox/lock";
pub const DEFAULT_SESSION_DIR: &str = "/var/lib/chrootbox/session";

/// Where setup keeps its state, and how it reports
#[derive(Clone, Debug)]
pub struct SetupContext {
    pub log: LogContext,
    pub lock_dir: PathBuf,
    pub session_dir: PathBuf,
    /// Owner required of loopback and archive files
    pub privileged_uid: u32,
    pub lock_timeout: Duration,
}

impl SetupContext {
    pub fn new(lock_dir: impl Into<PathBuf>, session_dir: impl Into<PathBuf>) -> Self {
        Self {
            log: LogContext::default(),
            lock_dir: lock_dir.into(),
            session_dir: session_dir.into(),
            privileged_uid: 0,
            lock_timeout: DEFAULT_DEVICE_LOCK_TIMEOUT,
        }
    }

    pub fn with_log(mut self, log: LogContext) -> Self {
        self.log = log;
        self
    }

    pub fn with_privileged_uid(mut self, uid: u32) -> Self {
        self.privileged_uid = uid;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn session_store(&self) -> SessionStore {
        SessionStore::new(&self.session_dir)
    }
}

impl Default for SetupContext {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_DIR, DEFAULT_SESSION_DIR)
    }
}

/// Runs the site's setup scripts for one phase
pub trait SetupRunner {
    fn run(&mut self, chroot: &Chroot, phase: SetupPhase, env: &Environment) -> Result<()>;
}

/// Runner for chroots without setup scripts
#[derive(Clone, Copy, Debug, Default)]
pub struct NullRunner;

impl SetupRunner for NullRunner {
    fn run(&mut self, _chroot: &Chroot, _phase: SetupPhase, _env: &Environment) -> Result<()> {
        Ok(())
    }
}

impl Chroot {
    /// Lock half of `phase`
    pub fn lock(&self, ctx: &SetupContext, phase: SetupPhase) -> Result<()> {
        self.setup_lock(ctx, phase, true, 0)
    }

    /// Unlock half of `phase`; `status` is the exit status of the session
    pub fn unlock(&self, ctx: &SetupContext, phase: SetupPhase, status: i32) -> Result<()> {
        self.setup_lock(ctx, phase, false, status)
    }

    fn setup_lock(&self, ctx: &SetupContext, phase: SetupPhase, lock: bool, status: i32) -> Result<()> {
        let storage = self.storage_facet().ok_or_else(|| ChrootError::Unsupported {
            chroot: self.name().to_string(),
            operation: "setup without storage".to_string(),
        })?;
        storage.setup_lock(self, ctx, phase, lock, status)
    }

    /// Run one phase: lock, setup scripts, unlock.
    ///
    /// If the scripts fail the unlock half still runs, with a non-zero
    /// status, before the script error is returned.
    pub fn setup(
        &self,
        ctx: &SetupContext,
        runner: &mut dyn SetupRunner,
        phase: SetupPhase,
        exit_status: i32,
    ) -> Result<()> {
        ctx.log.info(format!("{}: {}", self.name(), phase));
        AuditEvent::new(AuditEventType::SetupStarted, self.name())
            .with_phase(phase)
            .emit();

        if let Err(e) = self.lock(ctx, phase) {
            self.audit_failure(phase, &e);
            return Err(e);
        }

        let scripts = if self.run_setup_scripts() {
            let mut env = Environment::new();
            self.setup_env(&mut env);
            runner.run(self, phase, &env).map_err(|e| match e {
                ChrootError::Setup { .. } => e,
                other => ChrootError::Setup {
                    chroot: self.name().to_string(),
                    phase,
                    message: other.to_string(),
                },
            })
        } else {
            Ok(())
        };

        let status = if scripts.is_ok() { exit_status } else { 1 };
        let unlocked = self.unlock(ctx, phase, status);

        match (scripts, unlocked) {
            (Ok(()), Ok(())) => {
                AuditEvent::new(AuditEventType::SetupCompleted, self.name())
                    .with_phase(phase)
                    .emit();
                Ok(())
            }
            (Err(e), unlocked) => {
                if let Err(unlock_error) = unlocked {
                    ctx.log.warning(format!("{}: {}", self.name(), unlock_error));
                }
                self.audit_failure(phase, &e);
                Err(e)
            }
            (Ok(()), Err(e)) => {
                self.audit_failure(phase, &e);
                Err(e)
            }
        }
    }

    fn audit_failure(&self, phase: SetupPhase, error: &ChrootError) {
        AuditEvent::new(AuditEventType::SetupFailed, self.name())
            .with_phase(phase)
            .with_details(error.to_string())
            .emit();
    }

    /// Record the session at start, forget it at stop; no-op for templates
    pub(crate) fn setup_session_info(&self, ctx: &SetupContext, start: bool) -> Result<()> {
        if !self.is_session() {
            return Ok(());
        }
        let store = ctx.session_store();
        let event = if start {
            store.save(self)?;
            AuditEventType::SessionRecorded
        } else {
            store.remove(self.name())?;
            AuditEventType::SessionRemoved
        };
        AuditEvent::new(event, self.name())
            .with_details(store.session_path(self.name()).display().to_string())
            .emit();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chroot::SessionRequest;
    use crate::facet::storage::DirectoryFacet;
    use tempfile::TempDir;

    struct RecordingRunner {
        calls: Vec<(SetupPhase, Option<String>)>,
        fail: bool,
    }

    impl SetupRunner for RecordingRunner {
        fn run(&mut self, _chroot: &Chroot, phase: SetupPhase, env: &Environment) -> Result<()> {
            self.calls
                .push((phase, env.get("SESSION_ID").map(str::to_string)));
            if self.fail {
                Err(ChrootError::Setup {
                    chroot: "test".to_string(),
                    phase,
                    message: "script exited 1".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn directory_session(dir: &TempDir) -> Chroot {
        let mut template = Chroot::create("directory", "sid").unwrap();
        template
            .add_facet(DirectoryFacet::new(dir.path().join("root")))
            .unwrap();
        template
            .clone_session(&SessionRequest::new("sid-1", "sid"))
            .unwrap()
    }

    #[test]
    fn test_setup_runs_scripts_with_session_env() {
        let dir = TempDir::new().unwrap();
        let ctx = SetupContext::new(dir.path().join("lock"), dir.path().join("session"));
        let session = directory_session(&dir);

        let mut runner = RecordingRunner { calls: Vec::new(), fail: false };
        session.setup(&ctx, &mut runner, SetupPhase::Start, 0).unwrap();
        assert!(ctx.session_store().exists("sid-1"));

        session.setup(&ctx, &mut runner, SetupPhase::Stop, 0).unwrap();
        assert!(!ctx.session_store().exists("sid-1"));

        assert_eq!(
            runner.calls,
            vec![
                (SetupPhase::Start, Some("sid-1".to_string())),
                (SetupPhase::Stop, Some("sid-1".to_string())),
            ]
        );
    }

    #[test]
    fn test_failed_scripts_keep_session_record() {
        let dir = TempDir::new().unwrap();
        let ctx = SetupContext::new(dir.path().join("lock"), dir.path().join("session"));
        let session = directory_session(&dir);

        session
            .setup(&ctx, &mut NullRunner, SetupPhase::Start, 0)
            .unwrap();

        let mut runner = RecordingRunner { calls: Vec::new(), fail: true };
        let err = session
            .setup(&ctx, &mut runner, SetupPhase::Stop, 0)
            .unwrap_err();
        assert!(matches!(err, ChrootError::Setup { .. }));
        assert!(ctx.session_store().exists("sid-1"));
    }

    #[test]
    fn test_scripts_skipped_when_disabled() {
        let dir = TempDir::new().unwrap();
        let ctx = SetupContext::new(dir.path().join("lock"), dir.path().join("session"));
        let mut session = directory_session(&dir);
        session.set_run_setup_scripts(false);

        let mut runner = RecordingRunner { calls: Vec::new(), fail: true };
        session.setup(&ctx, &mut runner, SetupPhase::Start, 0).unwrap();
        assert!(runner.calls.is_empty());
    }

    #[test]
    fn test_templates_are_not_recorded() {
        let dir = TempDir::new().unwrap();
        let ctx = SetupContext::new(dir.path().join("lock"), dir.path().join("session"));
        let template = Chroot::new("sid", DirectoryFacet::new(dir.path()));

        template.lock(&ctx, SetupPhase::Start).unwrap();
        template.unlock(&ctx, SetupPhase::Start, 0).unwrap();
        assert!(ctx.session_store().list().unwrap().is_empty());
    }
}
