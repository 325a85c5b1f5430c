use std::collections::VecDeque;

const MAX_NOTICES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub body: String,
    pub kind: NoticeKind,
}

/// Toast surface.
pub trait Notifier {
    fn notify(&mut self, title: &str, body: &str, kind: NoticeKind);
}

/// The on-screen feed: newest first, bounded.
#[derive(Debug, Default)]
pub struct Feed {
    notices: VecDeque<Notice>,
}

impl Feed {
    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    pub fn latest(&self) -> Option<&Notice> {
        self.notices.front()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }
}

impl Notifier for Feed {
    fn notify(&mut self, title: &str, body: &str, kind: NoticeKind) {
        self.notices.push_front(Notice {
            title: title.to_string(),
            body: body.to_string(),
            kind,
        });
        while self.notices.len() > MAX_NOTICES {
            self.notices.pop_back();
        }
    }
}

/// Prints notices to stdout; used by the non-interactive subcommands.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&mut self, title: &str, body: &str, kind: NoticeKind) {
        let marker = match kind {
            NoticeKind::Info => "·",
            NoticeKind::Success => "✓",
            NoticeKind::Error => "✗",
        };
        println!("{marker} {title}: {body}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_keeps_newest_five() {
        let mut feed = Feed::default();
        for i in 0..7 {
            feed.notify(&format!("n{i}"), "", NoticeKind::Info);
        }
        let titles: Vec<_> = feed.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["n6", "n5", "n4", "n3", "n2"]);
        assert_eq!(feed.latest().unwrap().title, "n6");
    }
}
