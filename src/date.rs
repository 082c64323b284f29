use std::cell::RefCell;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{BufMut, BytesMut};

// "Sun, 06 Nov 1994 08:49:37 GMT".len()
pub(crate) const DATE_VALUE_LENGTH: usize = 29;

/// Appends the current date in IMF-fixdate form, refreshed at one-second
/// granularity so pipelined responses don't reformat it on every write.
pub(crate) fn extend(dst: &mut BytesMut) {
    CACHED.with(|cache| {
        let mut cache = cache.borrow_mut();
        cache.check();
        dst.put_slice(cache.buffer());
    })
}

struct CachedDate {
    bytes: [u8; DATE_VALUE_LENGTH],
    next_update: SystemTime,
}

thread_local!(static CACHED: RefCell<CachedDate> = RefCell::new(CachedDate::new()));

impl CachedDate {
    fn new() -> Self {
        let mut cache = CachedDate {
            bytes: [0; DATE_VALUE_LENGTH],
            next_update: UNIX_EPOCH,
        };
        cache.update(SystemTime::now());
        cache
    }

    fn buffer(&self) -> &[u8] {
        &self.bytes[..]
    }

    fn check(&mut self) {
        let now = SystemTime::now();
        if now > self.next_update {
            self.update(now);
        }
    }

    fn update(&mut self, now: SystemTime) {
        let formatted = httpdate::fmt_http_date(now);
        debug_assert!(formatted.len() == DATE_VALUE_LENGTH);
        self.bytes.copy_from_slice(formatted.as_bytes());
        self.next_update = now + Duration::from_secs(1);
    }
}
