//! Time-ordered, collision-resistant keys for new collection children.
//!
//! Layout: 8 characters of millisecond timestamp followed by 12 random
//! characters, all drawn from a 64-symbol alphabet whose ASCII order matches
//! symbol value. Keys therefore sort by creation time. Two keys generated in
//! the same millisecond reuse the random tail incremented by one, which keeps
//! them strictly ordered.

use std::sync::Mutex;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";
const TIME_CHARS: usize = 8;
const RANDOM_CHARS: usize = 12;

#[derive(Default)]
struct State {
    last_millis: i64,
    last_random: [u8; RANDOM_CHARS],
}

/// Generator of push ids; one per store handle.
#[derive(Default)]
pub struct PushIdGenerator {
    state: Mutex<State>,
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        self.next_id_at(chrono::Utc::now().timestamp_millis())
    }

    fn next_id_at(&self, now_millis: i64) -> String {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Never step backwards if the wall clock does
        let millis = now_millis.max(state.last_millis);

        if millis == state.last_millis && state.last_millis != 0 {
            increment_tail(&mut state.last_random);
        } else {
            for digit in state.last_random.iter_mut() {
                *digit = rand::random::<u8>() % 64;
            }
        }
        state.last_millis = millis;

        let mut id = String::with_capacity(TIME_CHARS + RANDOM_CHARS);
        let mut time_digits = [0u8; TIME_CHARS];
        let mut remaining = millis;
        for digit in time_digits.iter_mut().rev() {
            *digit = (remaining % 64) as u8;
            remaining /= 64;
        }
        id.extend(time_digits.iter().map(|&d| PUSH_CHARS[d as usize] as char));
        id.extend(
            state
                .last_random
                .iter()
                .map(|&d| PUSH_CHARS[d as usize] as char),
        );
        id
    }
}

/// Add one to a base-64 digit string, carrying leftwards.
fn increment_tail(digits: &mut [u8; RANDOM_CHARS]) {
    for digit in digits.iter_mut().rev() {
        if *digit == 63 {
            *digit = 0;
        } else {
            *digit += 1;
            return;
        }
    }
}
