//! Deterministic volume archives and content digests.
//!
//! Archiving the same tree twice yields byte-identical output: entries are
//! sorted, ownership and timestamps are zeroed and the gzip header carries no
//! mtime.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use sha2::{Digest, Sha256};
use tar::{Archive, Builder, EntryType, Header};

/// Digest and size of a written file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub sha256: String,
    pub bytes: u64,
}

/// Pack the contents of `source` into a gzipped tar at `dest`.
///
/// A missing `source` yields an empty archive.
pub fn pack_dir(source: &Path, dest: &Path) -> io::Result<FileDigest> {
    let mut entries = Vec::new();
    if source.exists() {
        collect(source, Path::new(""), &mut entries)?;
    }
    entries.sort();

    let file = File::create(dest)?;
    let gz = GzBuilder::new()
        .mtime(0)
        .write(BufWriter::new(file), Compression::default());
    let mut tar = Builder::new(gz);

    for relative in &entries {
        let path = source.join(relative);
        let meta = fs::symlink_metadata(&path)?;
        let mut header = Header::new_gnu();
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mode(mode_of(&meta));

        if meta.file_type().is_symlink() {
            header.set_entry_type(EntryType::Symlink);
            header.set_size(0);
            tar.append_link(&mut header, relative, fs::read_link(&path)?)?;
        } else if meta.is_dir() {
            header.set_entry_type(EntryType::Directory);
            header.set_size(0);
            tar.append_data(&mut header, relative, io::empty())?;
        } else {
            header.set_entry_type(EntryType::Regular);
            header.set_size(meta.len());
            tar.append_data(&mut header, relative, BufReader::new(File::open(&path)?))?;
        }
    }

    let mut writer = tar.into_inner()?.finish()?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    drop(writer);

    digest_file(dest)
}

/// Unpack a gzipped tar produced by [`pack_dir`] into `dest`.
pub fn unpack_into(archive: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(File::open(archive)?)));
    archive.set_preserve_mtime(false);
    archive.unpack(dest)
}

/// SHA-256 and length of a file.
pub fn digest_file(path: &Path) -> io::Result<FileDigest> {
    let mut hasher = Sha256::new();
    let bytes = io::copy(&mut BufReader::new(File::open(path)?), &mut hasher)?;
    Ok(FileDigest {
        sha256: hex::encode(hasher.finalize()),
        bytes,
    })
}

/// Write `bytes` to `path`, fsync, and return the digest.
pub fn write_digested(path: &Path, bytes: &[u8]) -> io::Result<FileDigest> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(FileDigest {
        sha256: hex::encode(Sha256::digest(bytes)),
        bytes: bytes.len() as u64,
    })
}

/// Flush directory metadata so a completed rename survives a crash.
pub fn sync_dir(path: &Path) -> io::Result<()> {
    File::open(path)?.sync_all()
}

fn collect(root: &Path, relative: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(root.join(relative))? {
        let entry = entry?;
        let child = relative.join(entry.file_name());
        let file_type = entry.file_type()?;
        out.push(child.clone());
        if file_type.is_dir() {
            collect(root, &child, out)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn mode_of(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(meta: &fs::Metadata) -> u32 {
    if meta.is_dir() {
        0o755
    } else {
        0o644
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume(dir: &Path) -> PathBuf {
        let root = dir.join("pgdata");
        fs::create_dir_all(root.join("base/1")).unwrap();
        fs::write(root.join("PG_VERSION"), "16\n").unwrap();
        fs::write(root.join("base/1/1259"), vec![7u8; 4096]).unwrap();
        root
    }

    #[test]
    fn packing_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let source = volume(dir.path());
        let first = pack_dir(&source, &dir.path().join("a.tar.gz")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        // Touch mtimes; the archive must not change.
        fs::write(source.join("PG_VERSION"), "16\n").unwrap();
        let second = pack_dir(&source, &dir.path().join("b.tar.gz")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unpack_restores_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        let source = volume(dir.path());
        let archive = dir.path().join("pgdata.tar.gz");
        pack_dir(&source, &archive).unwrap();

        let target = dir.path().join("restored");
        unpack_into(&archive, &target).unwrap();
        assert_eq!(fs::read_to_string(target.join("PG_VERSION")).unwrap(), "16\n");
        assert_eq!(fs::read(target.join("base/1/1259")).unwrap().len(), 4096);
    }

    #[test]
    fn missing_source_packs_empty() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("empty.tar.gz");
        pack_dir(&dir.path().join("absent"), &archive).unwrap();
        let target = dir.path().join("out");
        unpack_into(&archive, &target).unwrap();
        assert_eq!(fs::read_dir(&target).unwrap().count(), 0);
    }

    #[test]
    fn digests_match_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x");
        let written = write_digested(&path, b"abc").unwrap();
        assert_eq!(
            written.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(digest_file(&path).unwrap(), written);
    }
}
