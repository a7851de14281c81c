//! Pure path translation between source files and destination artifacts.
//!
//! A source file is addressed by the root it was found under plus its path
//! relative to that root (`rel`). The destination artifact lives at the same
//! `rel` under the destination root, with the extension swapped for the
//! pointer extension when the file is a video. Pointer content re-roots `rel`
//! under the library root, which is the path basis the media server sees.
//!
//! Nothing in this module touches the filesystem.

use std::path::{Path, PathBuf};

use strm_core::{EntryKind, MonitoredMapping};

/// A source path split into its owning root and the path below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub root: PathBuf,
    pub rel: PathBuf,
}

impl SourceEntry {
    /// True when the entry is the source root itself.
    pub fn is_root(&self) -> bool {
        self.rel.as_os_str().is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PathMapper<'a> {
    mapping: &'a MonitoredMapping,
    /// Pointer extension without the leading dot.
    pointer_ext: &'a str,
}

impl<'a> PathMapper<'a> {
    pub fn new(mapping: &'a MonitoredMapping, pointer_extension: &'a str) -> Self {
        Self {
            mapping,
            pointer_ext: pointer_extension.trim_start_matches('.'),
        }
    }

    pub fn mapping(&self) -> &'a MonitoredMapping {
        self.mapping
    }

    /// First configured source root containing `source`, component-wise.
    pub fn locate(&self, source: &Path) -> Option<SourceEntry> {
        self.mapping.source_roots.iter().find_map(|root| {
            source.strip_prefix(root).ok().map(|rel| SourceEntry {
                root: root.clone(),
                rel: rel.to_path_buf(),
            })
        })
    }

    pub fn classify(&self, rel: &Path) -> EntryKind {
        self.mapping.classify(rel)
    }

    /// `dest/<rel minus extension>.<pointer ext>`
    pub fn pointer_path(&self, rel: &Path) -> PathBuf {
        self.mapping.dest_root.join(self.pointer_rel(rel))
    }

    /// `rel` with its extension replaced by the pointer extension.
    pub fn pointer_rel(&self, rel: &Path) -> PathBuf {
        rel.with_extension(self.pointer_ext)
    }

    /// `dest/<rel>`; also the mirrored location of a directory.
    pub fn dest_path(&self, rel: &Path) -> PathBuf {
        if rel.as_os_str().is_empty() {
            return self.mapping.dest_root.clone();
        }
        self.mapping.dest_root.join(rel)
    }

    /// Where the artifact for a source file lives, if the file produces one.
    pub fn artifact_path(&self, rel: &Path) -> Option<PathBuf> {
        match self.classify(rel) {
            EntryKind::Video => Some(self.pointer_path(rel)),
            EntryKind::Metadata => Some(self.dest_path(rel)),
            EntryKind::Other => None,
        }
    }

    /// Destination-relative path a source file justifies keeping.
    ///
    /// Videos map through the pointer-extension rule; everything else is
    /// unchanged.
    pub fn valid_dest_rel(&self, rel: &Path) -> PathBuf {
        match self.classify(rel) {
            EntryKind::Video => self.pointer_rel(rel),
            _ => rel.to_path_buf(),
        }
    }

    /// `library/<rel>`, the text written into a pointer artifact.
    pub fn pointer_content(&self, rel: &Path) -> PathBuf {
        self.mapping.library_root.join(rel)
    }

    /// `rel` under every source root, in configuration order.
    pub fn source_candidates<'p>(&'p self, rel: &'p Path) -> impl Iterator<Item = PathBuf> + 'p {
        self.mapping
            .source_roots
            .iter()
            .map(move |root| root.join(rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strm_core::{ExtensionSet, MappingId};

    fn mapping() -> MonitoredMapping {
        MonitoredMapping {
            id: MappingId(0),
            source_roots: vec![PathBuf::from("/mnt/cloud/movies"), PathBuf::from("/mnt/local")],
            dest_root: PathBuf::from("/strm/movies"),
            library_root: PathBuf::from("/media/movies"),
            video_extensions: ExtensionSet::new([".mp4", ".mkv"]),
            metadata_extensions: ExtensionSet::new([".nfo", ".jpg"]),
            create_pointers: true,
            copy_metadata: true,
        }
    }

    #[test]
    fn locate_uses_component_prefix() {
        let mapping = mapping();
        let mapper = PathMapper::new(&mapping, ".strm");
        let entry = mapper
            .locate(Path::new("/mnt/local/Alien (1979)/Alien.mkv"))
            .expect("inside root");
        assert_eq!(entry.root, PathBuf::from("/mnt/local"));
        assert_eq!(entry.rel, PathBuf::from("Alien (1979)/Alien.mkv"));

        // Sibling directory sharing a string prefix is not inside the root.
        assert!(mapper.locate(Path::new("/mnt/localother/a.mkv")).is_none());
    }

    #[test]
    fn pointer_content_rebases_onto_library_root() {
        let mapping = mapping();
        let mapper = PathMapper::new(&mapping, ".strm");
        let rel = Path::new("Heat (1995)/Heat.MKV");
        assert_eq!(
            mapper.pointer_content(rel),
            PathBuf::from("/media/movies/Heat (1995)/Heat.MKV")
        );
        assert_eq!(
            mapper.pointer_path(rel),
            PathBuf::from("/strm/movies/Heat (1995)/Heat.strm")
        );
    }

    #[test]
    fn only_final_extension_is_replaced() {
        let mapping = mapping();
        let mapper = PathMapper::new(&mapping, "strm");
        assert_eq!(
            mapper.pointer_rel(Path::new("show/ep.1080p.mp4")),
            PathBuf::from("show/ep.1080p.strm")
        );
    }

    #[test]
    fn artifact_path_by_kind() {
        let mapping = mapping();
        let mapper = PathMapper::new(&mapping, ".strm");
        assert_eq!(
            mapper.artifact_path(Path::new("a/movie.nfo")),
            Some(PathBuf::from("/strm/movies/a/movie.nfo"))
        );
        assert_eq!(mapper.artifact_path(Path::new("a/readme.txt")), None);
        assert_eq!(
            mapper.valid_dest_rel(Path::new("a/readme.txt")),
            PathBuf::from("a/readme.txt")
        );
    }

    #[test]
    fn root_maps_to_dest_root() {
        let mapping = mapping();
        let mapper = PathMapper::new(&mapping, ".strm");
        let entry = mapper.locate(Path::new("/mnt/local")).expect("root");
        assert!(entry.is_root());
        assert_eq!(mapper.dest_path(&entry.rel), PathBuf::from("/strm/movies"));
    }
}
