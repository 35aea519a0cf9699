/*
[INPUT]:  Outbound wire commands, routed inbound events, undecodable frames
[OUTPUT]: Rate-limited tracing samples
[POS]:    WebSocket layer - diagnostic logging that stays quiet on busy streams
[UPDATE]: When changing sample limits or log fields
*/

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info};

use super::key::SubscriptionKey;
use super::message::WireCommand;
use crate::error::TinvestError;

const MESSAGE_SAMPLE_LIMIT: usize = 3;
const SUBSCRIPTION_LOG_LIMIT: usize = 10;
const PARSE_FAIL_LOG_LIMIT: usize = 3;
const RAW_LOG_MAX_BYTES: usize = 1024;

static MESSAGE_SAMPLE_COUNT: AtomicUsize = AtomicUsize::new(0);
static SUBSCRIBE_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);
static PARSE_FAIL_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn log_subscription_sent(command: &WireCommand) {
    let count = SUBSCRIBE_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count >= SUBSCRIPTION_LOG_LIMIT {
        return;
    }

    info!(
        sample_index = count + 1,
        sample_limit = SUBSCRIPTION_LOG_LIMIT,
        event = %command.event,
        figi = command.key.figi(),
        "ws command sent"
    );
}

pub(crate) fn log_message_sample_once(key: &SubscriptionKey, listeners: usize) {
    let count = MESSAGE_SAMPLE_COUNT.fetch_add(1, Ordering::Relaxed);
    if count >= MESSAGE_SAMPLE_LIMIT {
        return;
    }

    info!(
        sample_index = count + 1,
        sample_limit = MESSAGE_SAMPLE_LIMIT,
        channel = key.kind(),
        figi = key.figi(),
        listeners,
        "ws message sample"
    );
}

pub(crate) fn log_parse_fail_once(err: &TinvestError, raw: &str) {
    let count = PARSE_FAIL_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < PARSE_FAIL_LOG_LIMIT {
        info!(
            sample_index = count + 1,
            sample_limit = PARSE_FAIL_LOG_LIMIT,
            error = %err,
            bytes = raw.len(),
            "ws message parse failed"
        );
        let preview = truncate_for_log(raw, RAW_LOG_MAX_BYTES);
        debug!(
            sample_index = count + 1,
            sample_limit = PARSE_FAIL_LOG_LIMIT,
            error = %err,
            bytes = raw.len(),
            message = %preview,
            "ws message parse failed"
        );
    }
}

pub(crate) fn truncate_for_log(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::with_capacity(end + 3);
    out.push_str(&value[..end]);
    out.push_str("...");
    out
}
