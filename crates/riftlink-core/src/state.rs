// ── Client state machine ──
//
// `ClientState::next` is the whole transition table. It is pure: the
// monitor samples processes and auth, builds a `Sample`, and asks for the
// next state. Sticky states are rows of the table, not early returns in
// the sampling code.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// Authoritative client state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientState {
    /// Nothing usable is running.
    #[default]
    Closed,
    /// The launcher is up and waiting for credentials.
    LoginReady,
    /// Credentials submitted; waiting for the launcher to accept them.
    WaitingLogin,
    /// A captcha challenge is open.
    WaitingCaptcha,
    /// A session exists (or the game itself is running).
    LoggedIn,
}

/// What the authentication endpoint reported on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSignal {
    /// Authenticated session.
    Success,
    /// The endpoint answered, but nobody is logged in yet.
    Pending,
    /// Not fetched, or the fetch failed.
    Unavailable,
}

/// Raw signals gathered on one polling tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// The launcher (lighter) process is running.
    pub client_running: bool,
    /// The game client (heavier) process is running.
    pub game_client_running: bool,
    /// A match is in progress.
    pub playing: bool,
    pub auth: AuthSignal,
}

impl Sample {
    /// Nothing running, nothing fetched.
    pub const IDLE: Self = Self {
        client_running: false,
        game_client_running: false,
        playing: false,
        auth: AuthSignal::Unavailable,
    };
}

impl ClientState {
    /// Next state from the previous one and a fresh sample.
    ///
    /// | previous         | condition                                        | next           |
    /// |------------------|--------------------------------------------------|----------------|
    /// | `WaitingLogin`   | auth success                                     | `LoggedIn`     |
    /// | `WaitingLogin`   | otherwise                                        | `WaitingLogin` |
    /// | `WaitingCaptcha` | always                                           | `WaitingCaptcha` |
    /// | any other        | auth success, playing or game client running     | `LoggedIn`     |
    /// | any other        | launcher running and auth pending                | `LoginReady`   |
    /// | any other        | otherwise                                        | `Closed`       |
    pub fn next(self, sample: &Sample) -> Self {
        match self {
            Self::WaitingLogin => {
                if sample.auth == AuthSignal::Success {
                    Self::LoggedIn
                } else {
                    Self::WaitingLogin
                }
            }
            Self::WaitingCaptcha => Self::WaitingCaptcha,
            Self::Closed | Self::LoginReady | Self::LoggedIn => {
                if sample.auth == AuthSignal::Success
                    || sample.playing
                    || sample.game_client_running
                {
                    Self::LoggedIn
                } else if sample.client_running && sample.auth == AuthSignal::Pending {
                    Self::LoginReady
                } else {
                    Self::Closed
                }
            }
        }
    }

    /// States the polling tick never leaves on its own.
    pub fn is_sticky(self) -> bool {
        matches!(self, Self::WaitingLogin | Self::WaitingCaptcha)
    }

    /// Whether the auth endpoint should be queried this tick.
    pub fn needs_auth_sample(self, client_running: bool) -> bool {
        client_running || self == Self::WaitingLogin
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const ALL_STATES: [ClientState; 5] = [
        ClientState::Closed,
        ClientState::LoginReady,
        ClientState::WaitingLogin,
        ClientState::WaitingCaptcha,
        ClientState::LoggedIn,
    ];

    fn all_samples() -> Vec<Sample> {
        let mut out = Vec::new();
        for bits in 0..8_u8 {
            for auth in [AuthSignal::Success, AuthSignal::Pending, AuthSignal::Unavailable] {
                out.push(Sample {
                    client_running: bits & 1 != 0,
                    game_client_running: bits & 2 != 0,
                    playing: bits & 4 != 0,
                    auth,
                });
            }
        }
        out
    }

    #[test]
    fn serializes_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&ClientState::LoginReady).expect("json"),
            "\"LOGIN_READY\""
        );
        assert_eq!(ClientState::WaitingCaptcha.to_string(), "WAITING_CAPTCHA");
        assert_eq!(ClientState::default(), ClientState::Closed);
    }

    #[test]
    fn idle_sample_closes_non_sticky_states() {
        for state in ALL_STATES {
            let next = state.next(&Sample::IDLE);
            if state.is_sticky() {
                assert_eq!(next, state);
            } else {
                assert_eq!(next, ClientState::Closed);
            }
        }
    }

    #[test]
    fn launcher_with_pending_auth_is_login_ready() {
        let sample = Sample {
            client_running: true,
            auth: AuthSignal::Pending,
            ..Sample::IDLE
        };
        assert_eq!(ClientState::Closed.next(&sample), ClientState::LoginReady);
        assert_eq!(ClientState::LoggedIn.next(&sample), ClientState::LoginReady);
    }

    #[test]
    fn launcher_without_auth_answer_is_closed() {
        let sample = Sample {
            client_running: true,
            ..Sample::IDLE
        };
        assert_eq!(ClientState::LoginReady.next(&sample), ClientState::Closed);
    }

    #[test]
    fn logged_in_signals_win() {
        for sample in [
            Sample {
                auth: AuthSignal::Success,
                client_running: true,
                ..Sample::IDLE
            },
            Sample {
                playing: true,
                ..Sample::IDLE
            },
            Sample {
                game_client_running: true,
                ..Sample::IDLE
            },
        ] {
            assert_eq!(ClientState::Closed.next(&sample), ClientState::LoggedIn);
        }
    }

    #[test]
    fn waiting_login_only_resolves_on_success() {
        let heavy = Sample {
            game_client_running: true,
            playing: true,
            ..Sample::IDLE
        };
        assert_eq!(ClientState::WaitingLogin.next(&heavy), ClientState::WaitingLogin);

        let success = Sample {
            auth: AuthSignal::Success,
            ..Sample::IDLE
        };
        assert_eq!(ClientState::WaitingLogin.next(&success), ClientState::LoggedIn);
    }

    #[test]
    fn ticks_never_enter_interactive_states() {
        for state in ALL_STATES {
            for sample in all_samples() {
                let next = state.next(&sample);
                if next == ClientState::WaitingCaptcha {
                    assert_eq!(state, ClientState::WaitingCaptcha, "{sample:?}");
                }
                if next == ClientState::WaitingLogin {
                    assert_eq!(state, ClientState::WaitingLogin, "{sample:?}");
                }
            }
        }
    }

    #[test]
    fn transitions_are_deterministic() {
        for state in ALL_STATES {
            for sample in all_samples() {
                assert_eq!(state.next(&sample), state.next(&sample));
            }
        }
    }

    #[test]
    fn auth_sampling_rule() {
        assert!(ClientState::Closed.needs_auth_sample(true));
        assert!(!ClientState::Closed.needs_auth_sample(false));
        assert!(ClientState::WaitingLogin.needs_auth_sample(false));
    }
}
