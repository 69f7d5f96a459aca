//! Auth phase state machine.
//!
//! ```text
//!                 SignInRequested
//!   SignedOut ───────────────────────► SigningIn
//!      ▲  ▲                              │  │
//!      │  └──── RequestFailed ───────────┘  │ SessionIssued
//!      │        NoSessionIssued             ▼
//!      │                                 SignedIn ◄──────────────┐
//!      │  SessionEnded                     │  │                  │
//!      └───────────────────────────────────┘  │ SignInRequested  │ SessionIssued
//!                                             ▼                  │
//!                                      Reauthenticating ─────────┘
//!
//!   SignedIn/Reauthenticating ── SignOutRequested ──► SigningOut ── SessionEnded ──► SignedOut
//! ```
//!
//! Each call moves the machine on request; the backend's session-change
//! notifications complete the transition. A user is present exactly in
//! `SignedIn`, `Reauthenticating` and `SigningOut`.

use rust_fsm::*;
use serde::Serialize;

state_machine! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub auth_machine(SignedOut)

    SignedOut => {
        SignInRequested => SigningIn,
        SignOutRequested => SignedOut,
        SessionIssued => SignedIn,
        SessionEnded => SignedOut,
        RequestFailed => SignedOut,
        NoSessionIssued => SignedOut
    },
    SigningIn => {
        SignInRequested => SigningIn,
        // Sign-out while a sign-in is in flight leaves the outcome to the sign-in.
        SignOutRequested => SigningIn,
        SessionIssued => SignedIn,
        SessionEnded => SigningIn,
        RequestFailed => SignedOut,
        NoSessionIssued => SignedOut
    },
    SignedIn => {
        SignInRequested => Reauthenticating,
        SignOutRequested => SigningOut,
        SessionIssued => SignedIn,
        SessionEnded => SignedOut,
        RequestFailed => SignedIn,
        NoSessionIssued => SignedIn
    },
    Reauthenticating => {
        SignInRequested => Reauthenticating,
        SignOutRequested => SigningOut,
        SessionIssued => SignedIn,
        // The old session ended; the new sign-in is still pending.
        SessionEnded => SigningIn,
        RequestFailed => SignedIn,
        NoSessionIssued => SignedIn
    },
    SigningOut => {
        SignInRequested => Reauthenticating,
        SignOutRequested => SigningOut,
        SessionIssued => SigningOut,
        SessionEnded => SignedOut,
        RequestFailed => SignedIn,
        NoSessionIssued => SigningOut
    }
}

pub use auth_machine::Input as AuthInput;
pub use auth_machine::State as AuthMachineState;
pub use auth_machine::StateMachine as AuthMachine;

/// Public view of the auth machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    SignedOut,
    SigningIn,
    SignedIn,
    Reauthenticating,
    SigningOut,
}

impl AuthPhase {
    /// Whether a transition is waiting on the backend.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(
            self,
            Self::SigningIn | Self::Reauthenticating | Self::SigningOut
        )
    }

    /// Whether this phase carries a user.
    #[must_use]
    pub const fn has_user(self) -> bool {
        matches!(
            self,
            Self::SignedIn | Self::Reauthenticating | Self::SigningOut
        )
    }
}

impl From<&AuthMachineState> for AuthPhase {
    fn from(state: &AuthMachineState) -> Self {
        match state {
            AuthMachineState::SignedOut => Self::SignedOut,
            AuthMachineState::SigningIn => Self::SigningIn,
            AuthMachineState::SignedIn => Self::SignedIn,
            AuthMachineState::Reauthenticating => Self::Reauthenticating,
            AuthMachineState::SigningOut => Self::SigningOut,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn run(inputs: &[AuthInput]) -> AuthPhase {
        let mut machine = AuthMachine::new();
        for input in inputs {
            machine.consume(input).unwrap();
        }
        AuthPhase::from(machine.state())
    }

    #[test]
    fn test_initial_phase_is_signed_out() {
        let machine = AuthMachine::new();
        assert_eq!(*machine.state(), AuthMachineState::SignedOut);
    }

    #[test]
    fn test_sign_in_completes_on_notification() {
        assert_eq!(run(&[AuthInput::SignInRequested]), AuthPhase::SigningIn);
        assert_eq!(
            run(&[AuthInput::SignInRequested, AuthInput::SessionIssued]),
            AuthPhase::SignedIn
        );
    }

    #[test]
    fn test_failed_sign_in_settles_signed_out() {
        assert_eq!(
            run(&[AuthInput::SignInRequested, AuthInput::RequestFailed]),
            AuthPhase::SignedOut
        );
        assert_eq!(
            run(&[AuthInput::SignInRequested, AuthInput::NoSessionIssued]),
            AuthPhase::SignedOut
        );
    }

    #[test]
    fn test_sign_out_flow() {
        let signed_in = [AuthInput::SignInRequested, AuthInput::SessionIssued];

        let mut inputs = signed_in.to_vec();
        inputs.push(AuthInput::SignOutRequested);
        assert_eq!(run(&inputs), AuthPhase::SigningOut);

        inputs.push(AuthInput::SessionEnded);
        assert_eq!(run(&inputs), AuthPhase::SignedOut);

        let mut failed = signed_in.to_vec();
        failed.extend([AuthInput::SignOutRequested, AuthInput::RequestFailed]);
        assert_eq!(run(&failed), AuthPhase::SignedIn);
    }

    #[test]
    fn test_sign_in_while_signed_in() {
        let inputs = [
            AuthInput::SessionIssued,
            AuthInput::SignInRequested,
            AuthInput::SessionEnded,
        ];
        assert_eq!(run(&inputs[..2]), AuthPhase::Reauthenticating);
        assert_eq!(run(&inputs), AuthPhase::SigningIn);
    }

    #[test]
    fn test_every_input_is_accepted_in_every_state() {
        let inputs = [
            AuthInput::SignInRequested,
            AuthInput::SignOutRequested,
            AuthInput::SessionIssued,
            AuthInput::SessionEnded,
            AuthInput::RequestFailed,
            AuthInput::NoSessionIssued,
        ];
        let prefixes: [&[AuthInput]; 5] = [
            &[],
            &[AuthInput::SignInRequested],
            &[AuthInput::SessionIssued],
            &[AuthInput::SessionIssued, AuthInput::SignInRequested],
            &[AuthInput::SessionIssued, AuthInput::SignOutRequested],
        ];

        for prefix in prefixes {
            for input in &inputs {
                let mut machine = AuthMachine::new();
                for step in prefix {
                    machine.consume(step).unwrap();
                }
                assert!(
                    machine.consume(input).is_ok(),
                    "{input:?} rejected after {prefix:?}"
                );
            }
        }
    }

    #[test]
    fn test_pending_and_user_flags() {
        assert!(AuthPhase::SigningIn.is_pending());
        assert!(!AuthPhase::SignedIn.is_pending());
        assert!(AuthPhase::SigningOut.has_user());
        assert!(!AuthPhase::SigningIn.has_user());
    }
}
