pub mod codegen;
pub mod directory;
pub mod gateway;
pub mod limits;
pub mod metrics;
pub mod notifier;
pub mod otp;
pub mod qr;
pub mod repository;
pub mod sweeper;
pub mod transactions;
pub mod wallet;

pub use directory::{Directory, InMemoryDirectory};
pub use gateway::{Authorization, GatewayError, PaymentGateway, RefundOutcome, SandboxGateway};
pub use limits::AmountLimits;
pub use metrics::{get_metrics, init_metrics};
pub use notifier::{Delivery, HttpNotifier, LoggingNotifier, Notification, NotificationChannel, Notifier};
pub use otp::{OtpManager, OtpSettings};
pub use qr::{QrCodeManager, QrSettings};
pub use sweeper::{SweepReport, Sweeper};
pub use transactions::{TransactionDeps, TransactionManager, TransactionSettings};
pub use wallet::WalletLedger;
