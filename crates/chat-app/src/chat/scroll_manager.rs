use crate::chat::events::ChatEvent;
use crate::chat::message::Message;

/// How many messages a full thread replacement reveals at the tail.
pub const TAIL_WINDOW: usize = 20;

/// Tracks which part of the thread the view has already revealed.
///
/// Every change of the message list produces exactly one scroll-to-bottom request
/// carrying the messages that became visible.
#[derive(Debug, Default)]
pub struct ScrollManager {
    revealed_len: usize,
}

impl ScrollManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The whole list was swapped (load, new chat): reveal only the tail window.
    pub fn reset(&mut self, messages: &[Message]) -> ChatEvent {
        let start = messages.len().saturating_sub(TAIL_WINDOW);
        self.revealed_len = messages.len();
        ChatEvent::ScrollToBottom {
            revealed: messages[start..].to_vec(),
            replaced: true,
        }
    }

    /// Messages were appended: reveal everything past the last revealed position.
    pub fn follow(&mut self, messages: &[Message]) -> ChatEvent {
        // A shrunk list can only come from a replacement that skipped `reset`.
        if messages.len() < self.revealed_len {
            return self.reset(messages);
        }

        let start = self.revealed_len;
        self.revealed_len = messages.len();
        ChatEvent::ScrollToBottom {
            revealed: messages[start..].to_vec(),
            replaced: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(len: usize) -> Vec<Message> {
        (0..len)
            .map(|index| Message::human(format!("message-{index}")))
            .collect()
    }

    #[test]
    fn reset_reveals_only_the_tail_window() {
        let mut scroll = ScrollManager::new();
        let messages = thread(TAIL_WINDOW + 5);

        match scroll.reset(&messages) {
            ChatEvent::ScrollToBottom { revealed, replaced } => {
                assert!(replaced);
                assert_eq!(revealed.len(), TAIL_WINDOW);
                assert_eq!(revealed.first(), messages.get(5));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(
            scroll.follow(&messages),
            ChatEvent::ScrollToBottom {
                revealed: Vec::new(),
                replaced: false,
            }
        );
    }

    #[test]
    fn follow_reveals_only_new_messages() {
        let mut scroll = ScrollManager::new();
        let mut messages = thread(2);
        scroll.reset(&messages);
        messages.push(Message::ai("reply"));

        assert_eq!(
            scroll.follow(&messages),
            ChatEvent::ScrollToBottom {
                revealed: vec![Message::ai("reply")],
                replaced: false,
            }
        );
    }

    #[test]
    fn empty_threads_still_request_a_scroll() {
        let mut scroll = ScrollManager::new();
        scroll.reset(&thread(3));

        assert_eq!(
            scroll.follow(&[]),
            ChatEvent::ScrollToBottom {
                revealed: Vec::new(),
                replaced: true,
            }
        );
    }
}
