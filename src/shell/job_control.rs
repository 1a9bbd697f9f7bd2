//! Signal handling and terminal ownership for job control.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::termios::{self, Termios};
use nix::unistd::{self, Pid};

use crate::errors::Result;
use crate::util::unix;

/// Set by the SIGCHLD handler, consumed by the main loop.
static CHILD_STATUS_CHANGED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigchld(_signal: libc::c_int) {
    CHILD_STATUS_CHANGED.store(true, Ordering::SeqCst);
}

/// Installs the SIGCHLD handler. The handler only raises a flag; the
/// table itself is updated by [`JobTable::reap`](crate::core::job::JobTable::reap)
/// from the main loop.
pub fn install_sigchld_handler() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(handle_sigchld),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    unsafe {
        signal::sigaction(Signal::SIGCHLD, &action)?;
    }
    Ok(())
}

/// Returns `true` once for every batch of SIGCHLDs received since the last
/// call.
pub fn take_pending_reap() -> bool {
    CHILD_STATUS_CHANGED.swap(false, Ordering::SeqCst)
}

const JOB_CONTROL_SIGNALS: [Signal; 5] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

pub fn initialize_job_control() -> Result<()> {
    let shell_terminal = unix::get_terminal();

    // Loop until the shell is in the foreground
    loop {
        let shell_pgid = unistd::getpgrp();
        if unistd::tcgetpgrp(shell_terminal)? == shell_pgid {
            break;
        }
        signal::killpg(shell_pgid, Signal::SIGTTIN)?;
    }

    // Ignore interactive and job-control signals
    for &signal in JOB_CONTROL_SIGNALS.iter() {
        unsafe {
            signal::signal(signal, SigHandler::SigIgn)?;
        }
    }

    // Put ourselves in our own process group
    let shell_pgid = Pid::this();
    if unistd::getpgrp() != shell_pgid {
        unistd::setpgid(shell_pgid, shell_pgid)?;
    }

    let temp_result = unistd::tcsetpgrp(shell_terminal, shell_pgid);
    log_if_err!(temp_result, "failed to grab control of terminal");

    Ok(())
}

/// Restores default dispositions in a freshly forked child, so that the job
/// reacts to Ctrl-C and Ctrl-Z. Failures are ignored: the child is about to
/// exec.
pub fn reset_signal_handlers() {
    for &signal in JOB_CONTROL_SIGNALS.iter().chain(&[Signal::SIGCHLD]) {
        unsafe {
            let _ = signal::signal(signal, SigHandler::SigDfl);
        }
    }
}

/// Captures the terminal modes, for restoring them when a stopped job is
/// continued in the foreground.
pub fn terminal_modes() -> Option<Termios> {
    termios::tcgetattr(unix::get_terminal()).ok()
}

pub fn set_terminal_modes(tmodes: &Termios) {
    let temp_result = termios::tcsetattr(unix::get_terminal(), termios::SetArg::TCSADRAIN, tmodes);
    log_if_err!(temp_result, "error setting terminal configuration");
}

/// RAII struct to encapsulate manipulating terminal state: the terminal
/// belongs to `new_pgid` until dropped.
#[derive(Debug)]
pub struct TerminalState {
    prev_pgid: Pid,
    prev_tmodes: Option<Termios>,
}

impl TerminalState {
    pub fn new(new_pgid: Pid) -> TerminalState {
        debug!("setting terminal process group to {}", new_pgid);
        let shell_terminal = unix::get_terminal();
        let state = TerminalState {
            prev_pgid: unistd::getpgrp(),
            prev_tmodes: termios::tcgetattr(shell_terminal).ok(),
        };
        let temp_result = unistd::tcsetpgrp(shell_terminal, new_pgid);
        log_if_err!(temp_result, "failed to give terminal to {}", new_pgid);
        state
    }
}

impl Drop for TerminalState {
    fn drop(&mut self) {
        debug!("putting shell back into foreground and restoring shell's terminal modes");
        let shell_terminal = unix::get_terminal();
        let temp_result = unistd::tcsetpgrp(shell_terminal, self.prev_pgid);
        log_if_err!(temp_result, "failed to take back the terminal");
        if let Some(ref prev_tmodes) = self.prev_tmodes {
            let temp_result =
                termios::tcsetattr(shell_terminal, termios::SetArg::TCSADRAIN, prev_tmodes);
            log_if_err!(
                temp_result,
                "error restoring terminal configuration for shell"
            );
        }
    }
}
