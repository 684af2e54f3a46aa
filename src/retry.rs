//! Retry policy (§4.6, §9 glossary): a pure function
//! `(attempts, priority, last reply) -> keep trying?`, consulted between
//! attempts by the pool and by a resolver's `Query`.

use crate::dns::DNSPacket;
use crate::error::DnsError;
use crate::priority::Priority;

/// Outcome of the prior attempt, fed back into the policy.
pub enum LastReply<'a> {
    None,
    Ok(&'a DNSPacket),
    Err(&'a DnsError),
}

pub trait RetryPolicy: Send + Sync {
    fn keep_trying(&self, attempts: u32, priority: Priority, last: LastReply<'_>) -> bool;
}

/// Stops when the attempt count exceeds the priority's retry cap, or
/// when the last reply's rcode is not in the retry set (§4.6). A
/// successful reply always carries `NoError`, which is not in the retry
/// set, so an `Ok` last reply stops just like a terminal error would —
/// the pool's caller has already returned early for any non-empty
/// answer, so the only `Ok` this policy ever sees is an empty-answer
/// (NODATA) reply that should be reported up rather than retried.
pub struct DefaultRetryPolicy;

impl RetryPolicy for DefaultRetryPolicy {
    fn keep_trying(&self, attempts: u32, priority: Priority, last: LastReply<'_>) -> bool {
        if attempts >= priority.max_retries() {
            return false;
        }
        match last {
            LastReply::None => true,
            LastReply::Ok(_) => false,
            LastReply::Err(err) => err.is_retriable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_past_the_priority_cap() {
        let policy = DefaultRetryPolicy;
        assert!(!policy.keep_trying(Priority::Low.max_retries(), Priority::Low, LastReply::None));
    }

    #[test]
    fn stops_on_terminal_error() {
        let policy = DefaultRetryPolicy;
        let err = DnsError::NameError;
        assert!(!policy.keep_trying(0, Priority::Normal, LastReply::Err(&err)));
    }

    #[test]
    fn continues_on_retriable_error() {
        let policy = DefaultRetryPolicy;
        let err = DnsError::Timeout;
        assert!(policy.keep_trying(0, Priority::Normal, LastReply::Err(&err)));
    }

    #[test]
    fn stops_on_empty_answer_success_reply() {
        let policy = DefaultRetryPolicy;
        let packet = DNSPacket::default();
        assert!(!policy.keep_trying(1, Priority::Normal, LastReply::Ok(&packet)));
    }
}
