//! Variant-fallback delivery driver.
//!
//! Attempts delivery over the ordered cross-product of source and
//! destination address variants. Each failed attempt is classified once:
//! a known bad-address signature moves on to the next pair, anything else
//! aborts the remaining pairs immediately.

use crate::notifier::variants::mask_for_logs;
use crate::twilio::{MessageReceipt, MessagingClient, ProviderError};
use tracing::{info, warn};

/// How a failed attempt affects the remaining sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptDisposition {
    /// Known invalid/malformed-number signature: try the next variant pair.
    RetryableInvalidAddress,
    /// Anything else: abort the whole sequence.
    Fatal,
}

/// Classify a provider error into a disposition for the retry driver.
///
/// Twilio reports an invalid destination as error code 21211; older
/// responses only carry a descriptive message, so a few known phrases are
/// matched as well.
pub fn classify(err: &ProviderError) -> AttemptDisposition {
    if err.code == Some(21211) {
        return AttemptDisposition::RetryableInvalidAddress;
    }
    let message = err.message.to_lowercase();
    let invalid_signature = message.contains("invalid")
        || message.contains("not a valid phone number")
        || message.contains("21211")
        || message.contains("to number");
    if invalid_signature {
        AttemptDisposition::RetryableInvalidAddress
    } else {
        AttemptDisposition::Fatal
    }
}

/// A successful delivery, with the variant pair that worked.
#[derive(Debug, Clone)]
pub struct Delivered {
    /// Provider receipt for the accepted message.
    pub receipt: MessageReceipt,
    /// Source variant that succeeded.
    pub source: String,
    /// Destination variant that succeeded.
    pub destination: String,
    /// Number of attempts made, including the successful one.
    pub attempts: usize,
}

/// Drive delivery attempts over `(source, destination)` pairs in order:
/// source outer loop, destination inner loop.
///
/// Stops at the first success. A fatal error aborts immediately; when every
/// pair is exhausted the last observed error is surfaced.
pub async fn send_with_fallback(
    client: &dyn MessagingClient,
    body: &str,
    sources: &[String],
    destinations: &[String],
) -> Result<Delivered, ProviderError> {
    let mut last_error: Option<ProviderError> = None;
    let mut attempts = 0usize;

    for source in sources {
        for destination in destinations {
            attempts += 1;
            info!(
                from = %mask_for_logs(source),
                to = %mask_for_logs(destination),
                attempt = attempts,
                "attempting send"
            );
            match client.send(body, source, destination).await {
                Ok(receipt) => {
                    info!(sid = %receipt.sid, status = %receipt.status, "message accepted");
                    return Ok(Delivered {
                        receipt,
                        source: source.clone(),
                        destination: destination.clone(),
                        attempts,
                    });
                }
                Err(err) => match classify(&err) {
                    AttemptDisposition::RetryableInvalidAddress => {
                        warn!(
                            from = %mask_for_logs(source),
                            to = %mask_for_logs(destination),
                            error = %err,
                            "send attempt rejected as invalid address, trying next variant"
                        );
                        last_error = Some(err);
                    }
                    AttemptDisposition::Fatal => {
                        warn!(error = %err, "send attempt failed fatally, aborting fallback");
                        return Err(err);
                    }
                },
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| ProviderError::transport("no variant pairs to attempt")))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted messaging client shared by notifier and scheduler tests.

    use crate::twilio::{MessageReceipt, MessageStatus, MessagingClient, ProviderError};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted response for one send attempt.
    pub enum Script {
        Ok(&'static str),
        Err(ProviderError),
    }

    /// Messaging client that replays scripted send results and records the
    /// `(from, to)` pair of every attempt.
    pub struct ScriptedClient {
        script: Mutex<VecDeque<Script>>,
        pub attempts: Mutex<Vec<(String, String)>>,
        pub status_queries: Mutex<Vec<String>>,
        pub status_result: Mutex<Option<Result<MessageStatus, ProviderError>>>,
    }

    impl ScriptedClient {
        pub fn new(script: Vec<Script>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                attempts: Mutex::new(Vec::new()),
                status_queries: Mutex::new(Vec::new()),
                status_result: Mutex::new(None),
            }
        }

        /// A client whose every send succeeds with the given SID.
        pub fn always_ok() -> Self {
            Self::new(Vec::new())
        }

        pub fn invalid_address(message: &str) -> ProviderError {
            ProviderError {
                code: Some(21211),
                message: message.to_owned(),
            }
        }

        pub fn fatal(message: &str) -> ProviderError {
            ProviderError {
                code: Some(20003),
                message: message.to_owned(),
            }
        }
    }

    #[async_trait]
    impl MessagingClient for ScriptedClient {
        async fn send(
            &self,
            _body: &str,
            from: &str,
            to: &str,
        ) -> Result<MessageReceipt, ProviderError> {
            self.attempts
                .lock()
                .expect("attempts lock")
                .push((from.to_owned(), to.to_owned()));
            match self.script.lock().expect("script lock").pop_front() {
                Some(Script::Ok(sid)) => Ok(MessageReceipt {
                    sid: sid.to_owned(),
                    status: "queued".to_owned(),
                }),
                Some(Script::Err(err)) => Err(err),
                // Script exhausted: default to success.
                None => Ok(MessageReceipt {
                    sid: "SM-default".to_owned(),
                    status: "queued".to_owned(),
                }),
            }
        }

        async fn fetch_status(&self, sid: &str) -> Result<MessageStatus, ProviderError> {
            self.status_queries
                .lock()
                .expect("status lock")
                .push(sid.to_owned());
            match self.status_result.lock().expect("result lock").take() {
                Some(result) => result,
                None => Ok(MessageStatus {
                    status: "delivered".to_owned(),
                    error_code: None,
                    error_message: None,
                }),
            }
        }
    }
}
