//! In-memory host and fixtures for unit tests.

use crate::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::identity::{ExecutionContext, IdentityProbe, UserRecord};
use crate::orchestrator::{Host, Orchestrator};
use crate::params::{ParamScope, ProvisioningParameters, RawParameters};
use crate::runlog::RunLog;
use crate::runner::PhaseReport;
use crate::step::{StepAction, StepContext};
use crate::switcher::IdentitySwitcher;
use crate::types::{Identity, PhaseKind};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

pub(crate) fn full_raw() -> RawParameters {
    RawParameters {
        user: Some("frappe".into()),
        db_password: Some("x".into()),
        site: Some("a.local".into()),
        admin_password: Some("y".into()),
        developer_mode: Some("true".into()),
        ssh_key: None,
    }
}

// ---------------------------------------------------------------------------
// FakeHost
// ---------------------------------------------------------------------------

/// Records every command instead of running it. Homes live under `base`.
pub(crate) struct FakeHost {
    base: PathBuf,
    current: RefCell<Identity>,
    users: RefCell<BTreeMap<String, PathBuf>>,
    ran: RefCell<Vec<(Identity, CommandSpec)>>,
    fail_on: RefCell<Vec<String>>,
    replies: RefCell<Vec<(String, CommandOutput)>>,
    on_path: RefCell<HashSet<String>>,
}

impl FakeHost {
    pub fn new(base: &Path, identity: Identity) -> Self {
        Self {
            base: base.to_path_buf(),
            current: RefCell::new(identity),
            users: RefCell::new(BTreeMap::new()),
            ran: RefCell::new(Vec::new()),
            fail_on: RefCell::new(Vec::new()),
            replies: RefCell::new(Vec::new()),
            on_path: RefCell::new(HashSet::new()),
        }
    }

    pub fn home_of(&self, name: &str) -> PathBuf {
        self.base.join("home").join(name)
    }

    pub fn add_user(&self, name: &str) -> PathBuf {
        let home = self.home_of(name);
        std::fs::create_dir_all(&home).unwrap();
        self.users.borrow_mut().insert(name.to_string(), home.clone());
        home
    }

    pub fn has_user(&self, name: &str) -> bool {
        self.users.borrow().contains_key(name)
    }

    pub fn become_identity(&self, identity: Identity) {
        *self.current.borrow_mut() = identity;
    }

    /// Any command whose display contains `pattern` exits 1.
    pub fn fail_on(&self, pattern: &str) {
        self.fail_on.borrow_mut().push(pattern.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_on.borrow_mut().clear();
    }

    pub fn reply(&self, pattern: &str, output: CommandOutput) {
        self.replies.borrow_mut().push((pattern.to_string(), output));
    }

    pub fn put_on_path(&self, program: &str) {
        self.on_path.borrow_mut().insert(program.to_string());
    }

    /// Display form of every command run so far.
    pub fn commands(&self) -> Vec<String> {
        self.ran.borrow().iter().map(|(_, c)| c.display()).collect()
    }

    pub fn commands_with_identity(&self) -> Vec<(Identity, CommandSpec)> {
        self.ran.borrow().clone()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(pattern)).count()
    }
}

impl IdentityProbe for FakeHost {
    fn current(&self) -> Result<ExecutionContext> {
        let identity = self.current.borrow().clone();
        let home = match &identity {
            Identity::Root => self.base.join("root"),
            Identity::User(name) => self
                .users
                .borrow()
                .get(name)
                .cloned()
                .unwrap_or_else(|| self.home_of(name)),
        };
        Ok(ExecutionContext { identity, home })
    }

    fn lookup_user(&self, name: &str) -> Result<Option<UserRecord>> {
        let users = self.users.borrow();
        Ok(users
            .iter()
            .position(|(n, _)| n == name)
            .map(|i| UserRecord {
                name: name.to_string(),
                uid: 1000 + i as u32,
                home: users[name].clone(),
            }))
    }
}

impl CommandRunner for FakeHost {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let line = spec.display();
        self.ran
            .borrow_mut()
            .push((self.current.borrow().clone(), spec.clone()));

        let exit = |code| {
            Ok(CommandOutput {
                code: Some(code),
                stdout: String::new(),
            })
        };
        if self.fail_on.borrow().iter().any(|p| line.contains(p.as_str())) {
            return exit(1);
        }
        if spec.program == "useradd" {
            if let Some(name) = spec.args.last() {
                // useradd exits 9 when the user already exists.
                if self.has_user(name) {
                    return exit(9);
                }
                self.add_user(name);
            }
        }
        if let Some((_, out)) = self
            .replies
            .borrow()
            .iter()
            .find(|(p, _)| line.contains(p.as_str()))
        {
            return Ok(out.clone());
        }
        exit(0)
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        self.on_path
            .borrow()
            .contains(program)
            .then(|| PathBuf::from("/usr/bin").join(program))
    }
}

// ---------------------------------------------------------------------------
// InProcessSwitcher
// ---------------------------------------------------------------------------

/// Runs the User Phase in this process with the fake host's identity switched
/// to the target user, the same way the `user-phase` entry point would.
pub(crate) struct InProcessSwitcher<'a> {
    host: &'a FakeHost,
    config: ProvisionConfig,
    pub unavailable: bool,
    pub reject: bool,
    pub handoffs: Cell<usize>,
}

impl<'a> InProcessSwitcher<'a> {
    pub fn new(host: &'a FakeHost, config: &ProvisionConfig) -> Self {
        Self {
            host,
            config: config.clone(),
            unavailable: false,
            reject: false,
            handoffs: Cell::new(0),
        }
    }
}

impl IdentitySwitcher for InProcessSwitcher<'_> {
    fn preflight(&self, _user: &UserRecord) -> Result<()> {
        if self.unavailable {
            return Err(ProvisionError::ElevationUnavailable(
                "sudo not found on PATH".to_string(),
            ));
        }
        Ok(())
    }

    fn hand_off(&self, user: &UserRecord, params: &RawParameters) -> Result<PhaseReport> {
        self.handoffs.set(self.handoffs.get() + 1);
        if self.reject {
            return Err(ProvisionError::ElevationRejected {
                user: user.name.clone(),
                reason: "a password is required".to_string(),
            });
        }
        self.host.become_identity(Identity::User(user.name.clone()));
        let result = (|| -> Result<PhaseReport> {
            let child = Orchestrator::new(
                self.config.clone(),
                Host {
                    identity: self.host,
                    commands: self.host,
                },
            )?;
            let mut log = RunLog::open(&self.config.user_log_path(&user.home), "user-phase")?;
            Ok(child.run_phase_only(PhaseKind::User, params, &mut log))
        })();
        self.host.become_identity(Identity::Root);
        result
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

pub(crate) struct Fixture {
    pub dir: TempDir,
    pub host: FakeHost,
    pub params: ProvisioningParameters,
    pub config: ProvisionConfig,
    pub exec: ExecutionContext,
    calls: Rc<RefCell<Vec<String>>>,
}

impl Fixture {
    pub fn new(identity: Identity) -> Self {
        let dir = TempDir::new().unwrap();
        let host = FakeHost::new(dir.path(), identity);
        let exec = host.current().unwrap();
        let config = ProvisionConfig {
            log_dir: dir.path().join("logs"),
            sudoers_dir: dir.path().join("etc/sudoers.d"),
            mariadb_config_path: dir.path().join("etc/mysql/99-frappe.cnf"),
            ..Default::default()
        };
        Self {
            params: full_raw().validate(ParamScope::Full).unwrap(),
            host,
            config,
            exec,
            dir,
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.calls)
    }

    pub fn ctx(&self) -> StepContext<'_> {
        StepContext {
            exec: &self.exec,
            params: &self.params,
            config: &self.config,
            commands: &self.host,
            users: &self.host,
        }
    }

    pub fn host_caps(&self) -> Host<'_> {
        Host {
            identity: &self.host,
            commands: &self.host,
        }
    }

    pub fn log(&self, script: &str) -> RunLog {
        RunLog::open(&self.config.log_dir, script).unwrap()
    }

    pub fn log_text(&self, script: &str) -> String {
        read_log(&self.config.log_dir, script)
    }

    /// The target user's own `user-phase` log.
    pub fn user_log_text(&self, user: &str) -> String {
        read_log(&self.config.user_log_path(&self.host.home_of(user)), "user-phase")
    }
}

fn read_log(dir: &Path, script: &str) -> String {
    let name = RunLog::file_name(script, chrono::Utc::now().date_naive());
    std::fs::read_to_string(dir.join(name)).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// RecordingAction
// ---------------------------------------------------------------------------

pub(crate) struct RecordingAction {
    name: String,
    calls: Rc<RefCell<Vec<String>>>,
    fail: bool,
    satisfied: bool,
}

impl RecordingAction {
    pub fn ok(name: &str, calls: &Rc<RefCell<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            calls: Rc::clone(calls),
            fail: false,
            satisfied: false,
        }
    }

    pub fn failing(name: &str, calls: &Rc<RefCell<Vec<String>>>) -> Self {
        Self {
            fail: true,
            ..Self::ok(name, calls)
        }
    }

    /// Report the target state as already present.
    pub fn satisfied(mut self) -> Self {
        self.satisfied = true;
        self
    }
}

impl StepAction for RecordingAction {
    fn already_satisfied(&self, _ctx: &StepContext<'_>) -> Result<bool> {
        Ok(self.satisfied)
    }

    fn apply(&self, _ctx: &StepContext<'_>) -> Result<()> {
        self.calls.borrow_mut().push(self.name.clone());
        if self.fail {
            return Err(ProvisionError::CommandFailed {
                command: self.name.clone(),
                code: Some(1),
            });
        }
        Ok(())
    }
}
