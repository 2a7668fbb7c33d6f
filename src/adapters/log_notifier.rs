use crate::core::error::AdapterError;
use crate::core::traits::Notifier;
use async_trait::async_trait;
use tracing::info;

/// Notifier that writes rule summaries to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_summary(
        &self,
        recipients: &[String],
        log: &str,
        applied_count: usize,
        failed_count: usize,
    ) -> Result<(), AdapterError> {
        info!(
            recipients = %recipients.join(", "),
            applied = applied_count,
            failed = failed_count,
            "rule run summary\n{log}"
        );
        Ok(())
    }
}
