/// Independent token sequences, one per kind of outstanding work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Conversations,
    Load,
    Subscription,
}

/// Tag attached to a spawned call so its result can be matched against newer calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken {
    pub kind: RequestKind,
    pub seq: u64,
}

/// Monotonic token issuer. Only the most recently issued token of a kind is current.
#[derive(Debug, Default)]
pub struct RequestTokens {
    conversations: u64,
    load: u64,
    subscription: u64,
}

impl RequestTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self, kind: RequestKind) -> RequestToken {
        let counter = self.counter_mut(kind);
        *counter = counter.saturating_add(1);
        RequestToken { kind, seq: *counter }
    }

    /// Makes every outstanding token of `kind` stale without issuing a new one.
    pub fn invalidate(&mut self, kind: RequestKind) {
        let counter = self.counter_mut(kind);
        *counter = counter.saturating_add(1);
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        self.counter(token.kind) == token.seq
    }

    fn counter(&self, kind: RequestKind) -> u64 {
        match kind {
            RequestKind::Conversations => self.conversations,
            RequestKind::Load => self.load,
            RequestKind::Subscription => self.subscription,
        }
    }

    fn counter_mut(&mut self, kind: RequestKind) -> &mut u64 {
        match kind {
            RequestKind::Conversations => &mut self.conversations,
            RequestKind::Load => &mut self.load,
            RequestKind::Subscription => &mut self.subscription,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_latest_token_is_current() {
        let mut tokens = RequestTokens::new();
        let first = tokens.issue(RequestKind::Load);
        let second = tokens.issue(RequestKind::Load);

        assert!(!tokens.is_current(first));
        assert!(tokens.is_current(second));
        assert!(second.seq > first.seq);
    }

    #[test]
    fn kinds_do_not_interfere() {
        let mut tokens = RequestTokens::new();
        let load = tokens.issue(RequestKind::Load);
        let fetch = tokens.issue(RequestKind::Conversations);
        tokens.issue(RequestKind::Subscription);

        assert!(tokens.is_current(load));
        assert!(tokens.is_current(fetch));
    }

    #[test]
    fn invalidate_retires_outstanding_tokens() {
        let mut tokens = RequestTokens::new();
        let load = tokens.issue(RequestKind::Load);
        tokens.invalidate(RequestKind::Load);

        assert!(!tokens.is_current(load));
    }
}
