use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use uuid::Uuid;

// URL-safe alphabet whose ASCII order matches its index order, so generated
// keys sort lexicographically by creation time.
const PUSH_ALPHABET: &[u8; 64] =
    b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

struct KeyState {
    last_millis: i64,
    last_tail: [u8; 12],
}

static KEY_STATE: Mutex<KeyState> = Mutex::new(KeyState {
    last_millis: -1,
    last_tail: [0; 12],
});

/// Server-assigned entry key: 8 characters encoding the creation timestamp in
/// milliseconds, then a 12-character random tail. Keys minted in the same
/// millisecond reuse the previous tail incremented by one, so consecutive
/// keys always sort in creation order.
pub fn push_key() -> String {
    let now = Utc::now().timestamp_millis();
    let mut state = KEY_STATE.lock().unwrap_or_else(PoisonError::into_inner);
    if now == state.last_millis {
        increment(&mut state.last_tail);
    } else {
        state.last_millis = now;
        state.last_tail = random_tail();
    }
    encode(now, &state.last_tail)
}

fn random_tail() -> [u8; 12] {
    let mut tail = [0u8; 12];
    // 256 is an exact multiple of 64, so reducing each byte mod 64 adds no
    // bias of its own.
    for (slot, byte) in tail.iter_mut().zip(Uuid::new_v4().into_bytes()) {
        *slot = byte % 64;
    }
    tail
}

fn increment(tail: &mut [u8; 12]) {
    for slot in tail.iter_mut().rev() {
        if *slot < 63 {
            *slot += 1;
            return;
        }
        *slot = 0;
    }
}

fn encode(timestamp_millis: i64, tail: &[u8; 12]) -> String {
    let mut stamp = [0u8; 8];
    let mut rest = timestamp_millis;
    for slot in stamp.iter_mut().rev() {
        *slot = (rest % 64) as u8;
        rest /= 64;
    }
    stamp
        .iter()
        .chain(tail.iter())
        .map(|index| PUSH_ALPHABET[*index as usize] as char)
        .collect()
}
