//! Code delivery that records each send in the log.

use gatekeep_core::error::GatekeepResult;
use gatekeep_core::repository::{CodeDelivery, DeliveryContext};
use tracing::info;

/// Logs each delivery instead of sending it. The code itself is only
/// logged when `reveal_codes` is set, for local development.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingCodeDelivery {
    reveal_codes: bool,
}

impl TracingCodeDelivery {
    pub fn new(reveal_codes: bool) -> Self {
        Self { reveal_codes }
    }

    fn visible_code<'a>(&self, code: &'a str) -> Option<&'a str> {
        self.reveal_codes.then_some(code)
    }
}

impl CodeDelivery for TracingCodeDelivery {
    async fn send_code(
        &self,
        destination: &str,
        code: &str,
        context: DeliveryContext,
    ) -> GatekeepResult<()> {
        info!(
            target: "gatekeep::delivery",
            destination,
            code = self.visible_code(code),
            context = context.as_str(),
            "verification code issued"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_hidden_by_default() {
        assert_eq!(TracingCodeDelivery::default().visible_code("123456"), None);
    }

    #[test]
    fn codes_are_shown_when_revealing() {
        let delivery = TracingCodeDelivery::new(true);
        assert_eq!(delivery.visible_code("123456"), Some("123456"));
    }
}
