pub mod health;
pub mod kill_switch;
pub mod notifier;
pub mod sweeper;

pub use health::{ComponentHealth, HealthResponse, HealthServer, HealthState, HealthStatus};
pub use kill_switch::KillSwitchService;
pub use notifier::{LogChannel, Notification, NotificationChannel, Notifier, WebhookChannel};
pub use sweeper::{Sweeper, SweeperConfig, SweeperStats};
