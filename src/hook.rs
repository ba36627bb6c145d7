//! Operator hook.
//!
//! Grounded in `hookhelper.py`'s `HookHelper.execute_hook` (name + parameter
//! list, fire-and-forget) and in the teacher's `CommandInput::run` for the
//! actual process-invocation shape (`context`/`what`, `shell_words::split`
//! to tokenize, `log` for visibility). Unlike `CommandInput::run`, there is
//! no configurable `OnFailure` here: Open Question 4 resolves this to
//! always log-and-swallow (§9, SPEC_FULL §12.4), so a failing hook never
//! fails the backup or restore it was attached to.

use std::process::Command;

use log::{debug, trace, warn};

/// An operator-configured command, invoked after notable lifecycle events
/// and never allowed to fail the run that triggered it.
#[derive(Clone, Debug, Default)]
pub struct OperatorHook {
    command: Option<String>,
}

impl OperatorHook {
    #[must_use]
    pub fn new(command: Option<String>) -> Self {
        Self { command }
    }

    /// Fires the hook with `context` (e.g. `"finish_medium"`) and `what`
    /// (e.g. a medium path) appended as its final argument. Always logs;
    /// never returns an error.
    pub fn fire(&self, context: &str, what: &str) {
        let Some(template) = &self.command else {
            trace!("not calling hook {context}:{what} - no hook configured");
            return;
        };

        let mut tokens = match shell_words::split(template) {
            Ok(tokens) => tokens,
            Err(err) => {
                warn!("hook {context}:{what} has an unparsable command {template:?}: {err}");
                return;
            }
        };
        if tokens.is_empty() {
            return;
        }
        let program = tokens.remove(0);
        tokens.push(what.to_owned());

        debug!("calling hook {context}:{what}: {program} {tokens:?}");
        match Command::new(&program).args(&tokens).status() {
            Ok(status) if status.success() => {}
            Ok(status) => warn!("hook {context}:{what} exited with {status}"),
            Err(err) => warn!("hook {context}:{what} failed to start: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_hook_is_a_no_op() {
        OperatorHook::new(None).fire("finish_medium", "/tmp/0000000001");
    }

    #[test]
    fn unparsable_command_does_not_panic() {
        OperatorHook::new(Some("'unterminated".to_owned())).fire("finish_medium", "/tmp/x");
    }

    #[test]
    fn failing_command_does_not_panic() {
        OperatorHook::new(Some("false".to_owned())).fire("finish_medium", "/tmp/x");
    }
}
