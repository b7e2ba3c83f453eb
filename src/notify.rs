/// External failure notifications.
///
/// The configured `on_fail` command is run with a subject and a body appended
/// to its arguments, e.g. `["mail", "-s"]` becomes
/// `mail -s "<subject>" "<body>"`. [`Notifier::notify`] does not wait; the
/// caller owns the returned [`Child`] and must reap it.
use crate::config::ArchiveConfig;
use std::collections::HashMap;
use std::io;
use std::process::{Child, Command, Stdio};

/// Runs the failure command of an archive configuration.
#[derive(Debug, Clone)]
pub struct Notifier {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
}

impl Notifier {
    /// Builds a notifier from the configured command and environment.
    ///
    /// Returns `None` when no command is configured.
    pub fn new(command: &[String], env: HashMap<String, String>) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            env,
        })
    }

    pub fn from_config(config: &ArchiveConfig) -> Option<Self> {
        Self::new(&config.on_fail, config.env.clone())
    }

    /// Starts the command with `subject` and `body` as its final arguments.
    ///
    /// A non-empty configured environment replaces the inherited one.
    pub fn notify(&self, subject: &str, body: &str) -> io::Result<Child> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(subject)
            .arg(body)
            .stdin(Stdio::null());
        if !self.env.is_empty() {
            command.env_clear().envs(&self.env);
        }
        command.spawn()
    }
}
