use crate::transport::executor::CallGatewayEnvelope;

/// Which gateway call outcomes a caller may retry. The executor itself never
/// retries; this is for callers that wrap it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_on_timeout: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_on_timeout: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDirective {
    Done,
    Retry,
    GiveUp,
}

const TOO_MANY_REQUESTS: u16 = 429;

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn attempt_limit(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn classify_envelope(&self, envelope: &CallGatewayEnvelope) -> RetryDirective {
        if envelope.success {
            return RetryDirective::Done;
        }
        match envelope.status_code {
            // Never reached the provider, or the answer was lost. A payment
            // may still have been created, so only retry when allowed.
            0 if self.retry_on_timeout => RetryDirective::Retry,
            0 => RetryDirective::GiveUp,
            TOO_MANY_REQUESTS => RetryDirective::Retry,
            500..=599 => RetryDirective::Retry,
            _ => RetryDirective::GiveUp,
        }
    }

    /// Directive for attempt number `attempt` (1-based), capped by the limit.
    pub fn next(&self, envelope: &CallGatewayEnvelope, attempt: u32) -> RetryDirective {
        match self.classify_envelope(envelope) {
            RetryDirective::Retry if attempt >= self.attempt_limit() => RetryDirective::GiveUp,
            other => other,
        }
    }
}

pub fn classify_envelope(envelope: &CallGatewayEnvelope) -> RetryDirective {
    RetryPolicy::default().classify_envelope(envelope)
}
