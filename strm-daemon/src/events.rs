//! Translation from raw `notify` events to [`SourceEvent`]s.

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};

use strm_sync::SourceEvent;

/// Map one watcher event to the source changes it describes.
///
/// Access and unclassified events produce nothing. A rename with an unknown
/// side is resolved by whether the path exists now.
pub fn classify(event: Event) -> Vec<SourceEvent> {
    let Event { kind, paths, .. } = event;
    match kind {
        EventKind::Create(_) => paths.into_iter().map(SourceEvent::Created).collect(),
        EventKind::Remove(_) => paths.into_iter().map(SourceEvent::Deleted).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() >= 2 => {
            let mut paths = paths.into_iter();
            match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => vec![SourceEvent::Moved { from, to }],
                _ => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.into_iter().map(SourceEvent::Deleted).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.into_iter().map(SourceEvent::Created).collect()
        }
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .into_iter()
            .map(|path| {
                if path.exists() {
                    SourceEvent::Created(path)
                } else {
                    SourceEvent::Deleted(path)
                }
            })
            .collect(),
        EventKind::Modify(_) => paths.into_iter().map(SourceEvent::Modified).collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind};
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |ev, p| ev.add_path(PathBuf::from(p)))
    }

    #[test]
    fn create_and_remove() {
        assert_eq!(
            classify(event(EventKind::Create(CreateKind::File), &["/src/a.mp4"])),
            vec![SourceEvent::Created("/src/a.mp4".into())]
        );
        assert_eq!(
            classify(event(EventKind::Remove(RemoveKind::Folder), &["/src/show"])),
            vec![SourceEvent::Deleted("/src/show".into())]
        );
    }

    #[test]
    fn rename_both_becomes_move() {
        let ev = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/src/a.mp4", "/src/b.mp4"],
        );
        assert_eq!(
            classify(ev),
            vec![SourceEvent::Moved {
                from: "/src/a.mp4".into(),
                to: "/src/b.mp4".into()
            }]
        );
    }

    #[test]
    fn rename_halves_map_to_delete_and_create() {
        assert_eq!(
            classify(event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/src/a"])),
            vec![SourceEvent::Deleted("/src/a".into())]
        );
        assert_eq!(
            classify(event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &["/src/b"])),
            vec![SourceEvent::Created("/src/b".into())]
        );
    }

    #[test]
    fn ambiguous_rename_checks_existence() {
        let tmp = TempDir::new().unwrap();
        let present = tmp.path().join("here.nfo");
        std::fs::write(&present, "x").unwrap();
        let absent = tmp.path().join("gone.nfo");

        let ev = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Any)))
            .add_path(present.clone())
            .add_path(absent.clone());
        assert_eq!(
            classify(ev),
            vec![SourceEvent::Created(present), SourceEvent::Deleted(absent)]
        );
    }

    #[test]
    fn content_changes_are_modifications() {
        let ev = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/src/a.nfo"],
        );
        assert_eq!(classify(ev), vec![SourceEvent::Modified("/src/a.nfo".into())]);
    }

    #[test]
    fn access_events_are_dropped() {
        let ev = event(EventKind::Access(AccessKind::Any), &["/src/a.nfo"]);
        assert!(classify(ev).is_empty());
        assert!(classify(event(EventKind::Other, &["/src/a"])).is_empty());
    }
}
