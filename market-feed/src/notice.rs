use std::time::{Duration, Instant};

pub const NOTICE_TTL: Duration = Duration::from_secs(5);

/// Short confirmation shown after a save toggle, dismissed automatically.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub message: String,
    shown_at: Instant,
}

impl Notice {
    pub fn new(message: impl Into<String>) -> Self {
        Self::shown_at(message, Instant::now())
    }

    pub fn shown_at(message: impl Into<String>, at: Instant) -> Self {
        Self {
            message: message.into(),
            shown_at: at,
        }
    }

    pub fn is_visible_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.shown_at) < NOTICE_TTL
    }

    pub fn is_visible(&self) -> bool {
        self.is_visible_at(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dismisses_after_five_seconds() {
        let start = Instant::now();
        let notice = Notice::shown_at("Post saved", start);
        assert!(notice.is_visible_at(start));
        assert!(notice.is_visible_at(start + Duration::from_millis(4_999)));
        assert!(!notice.is_visible_at(start + NOTICE_TTL));
    }
}
