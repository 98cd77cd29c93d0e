//! opsdeck-alert — health alerting for the ops console.
//!
//! ```text
//!   alerts.env ──► AlertConfig ──► enabled? channel? silenced?
//!                                          │
//!   HealthObserver ──► Observation ──► assess() ──► Assessment
//!                                                       │
//!   alerts_state.json ◄── decide() ◄────────────────────┘
//!                            │ send
//!                            ▼
//!                  Notifier ──► WeCom / Telegram / Bark
//! ```
//!
//! The daemon ([`AlertDaemon`]) drives one pass per interval. Deduplication
//! is by issue signature; an unchanged bad state is re-sent only after the
//! repeat interval.

pub mod channels;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod error;
pub mod evaluator;
pub mod ops;
pub mod settings;
pub mod silence;
pub mod state;

pub use channels::{AlertMessage, Notifier, NotifyChannel, SendReport};
pub use config::{AlertConfig, ChannelFlags};
pub use daemon::{AlertDaemon, append_alert_log};
pub use dispatch::{Decision, compose_message, compose_test_message, decide};
pub use error::{AlertError, AlertResult, ChannelError};
pub use evaluator::{Assessment, HealthObserver, Issue, IssueKey, Observation, ProbeObserver, assess};
pub use settings::{AlertConfigView, SaveRequest, config_view, save_config};
pub use silence::SilenceWindow;
pub use state::{AlertState, Level, SeenFlags};
