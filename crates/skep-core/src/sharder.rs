use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};

use skep_types::{Result, Sha1Hash, ShardId, SkepError};

/// A content-addressed piece of a file's plaintext. Immutable once built;
/// the payload is compressed and encrypted separately before transmission,
/// so `sha1` and `length` always describe plaintext.
pub struct Shard {
    pub id: ShardId,
    pub piece_number: i64,
    pub length: i64,
    pub sha1: Sha1Hash,
    pub payload: Vec<u8>,
}

/// Deferred shard: the byte range of one piece. Building a whole file's
/// plan touches only metadata; `materialize` does the read and hash.
#[derive(Debug, Clone)]
pub struct ShardPlan {
    pub path: PathBuf,
    pub piece_number: i64,
    pub offset: u64,
    pub length: u64,
}

impl ShardPlan {
    /// Read the planned byte range and hash it. Fails if the file shrank
    /// since planning; a changed file fails that piece, not the run.
    pub fn materialize(&self) -> Result<Shard> {
        let mut file = fs::File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let mut payload = vec![0u8; self.length as usize];
        file.read_exact(&mut payload)?;
        Ok(Shard {
            id: ShardId::generate(),
            piece_number: self.piece_number,
            length: self.length as i64,
            sha1: Sha1Hash::compute(&payload),
            payload,
        })
    }
}

/// Split a stream into fixed-size shards, hashing each piece. Piece numbers
/// are dense from 0 in read order; the final piece may be shorter. An empty
/// stream yields exactly one shard of length 0.
pub fn shard_stream(reader: &mut impl Read, shard_size: u64) -> Result<Vec<Shard>> {
    validate_shard_size(shard_size)?;
    let mut shards = Vec::new();
    let mut piece_number = 0i64;
    loop {
        let mut payload = Vec::new();
        reader
            .by_ref()
            .take(shard_size)
            .read_to_end(&mut payload)?;
        if payload.is_empty() && piece_number > 0 {
            break;
        }
        let short = (payload.len() as u64) < shard_size;
        shards.push(Shard {
            id: ShardId::generate(),
            piece_number,
            length: payload.len() as i64,
            sha1: Sha1Hash::compute(&payload),
            payload,
        });
        if short {
            break;
        }
        piece_number += 1;
    }
    Ok(shards)
}

/// Build the lazy shard plan for a file from its length alone.
pub fn plan_file(path: &Path, shard_size: u64) -> Result<Vec<ShardPlan>> {
    validate_shard_size(shard_size)?;
    let len = fs::metadata(path)?.len();
    Ok(plan_for_length(path, len, shard_size))
}

/// Piece layout for a file of `len` bytes. A zero-length file still gets
/// one empty piece.
pub fn plan_for_length(path: &Path, len: u64, shard_size: u64) -> Vec<ShardPlan> {
    if len == 0 {
        return vec![ShardPlan {
            path: path.to_path_buf(),
            piece_number: 0,
            offset: 0,
            length: 0,
        }];
    }
    let mut plans = Vec::with_capacity(len.div_ceil(shard_size) as usize);
    let mut offset = 0u64;
    let mut piece_number = 0i64;
    while offset < len {
        let length = (len - offset).min(shard_size);
        plans.push(ShardPlan {
            path: path.to_path_buf(),
            piece_number,
            offset,
            length,
        });
        offset += length;
        piece_number += 1;
    }
    plans
}

/// Whole-file SHA-1, streamed in 1 MiB reads.
pub fn hash_file(path: &Path) -> Result<Sha1Hash> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Sha1Hash(hasher.finalize().into()))
}

pub(crate) fn validate_shard_size(shard_size: u64) -> Result<()> {
    if shard_size == 0 {
        return Err(SkepError::Config("shard size must be positive".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;

    const S: u64 = 64;

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn shard_count_is_ceil_of_length_over_size() {
        for (len, expect) in [(1usize, 1usize), (63, 1), (64, 1), (65, 2), (192, 3), (193, 4)] {
            let data = patterned(len);
            let shards = shard_stream(&mut Cursor::new(&data), S).unwrap();
            assert_eq!(shards.len(), expect, "len={len}");
        }
    }

    #[test]
    fn empty_input_yields_one_empty_shard() {
        let shards = shard_stream(&mut Cursor::new(&[]), S).unwrap();
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0].piece_number, 0);
        assert_eq!(shards[0].length, 0);
        assert_eq!(shards[0].sha1, Sha1Hash::compute(b""));
    }

    #[test]
    fn concatenating_pieces_in_order_reproduces_input() {
        let data = patterned(3 * S as usize + 1);
        let shards = shard_stream(&mut Cursor::new(&data), S).unwrap();
        assert_eq!(shards.len(), 4);
        assert_eq!(shards.last().unwrap().length, 1);
        for (i, shard) in shards.iter().enumerate() {
            assert_eq!(shard.piece_number, i as i64);
        }
        let joined: Vec<u8> = shards.iter().flat_map(|s| s.payload.clone()).collect();
        assert_eq!(joined, data);
    }

    #[test]
    fn resharding_gives_same_hashes_but_fresh_ids() {
        let data = patterned(200);
        let a = shard_stream(&mut Cursor::new(&data), S).unwrap();
        let b = shard_stream(&mut Cursor::new(&data), S).unwrap();
        let hashes_a: Vec<_> = a.iter().map(|s| s.sha1).collect();
        let hashes_b: Vec<_> = b.iter().map(|s| s.sha1).collect();
        assert_eq!(hashes_a, hashes_b);
        for (sa, sb) in a.iter().zip(&b) {
            assert_ne!(sa.id, sb.id);
        }
    }

    #[test]
    fn lazy_plan_matches_eager_sharding() {
        let data = patterned(2 * S as usize + 17);
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&data).unwrap();

        let plans = plan_file(tmp.path(), S).unwrap();
        let eager = shard_stream(&mut Cursor::new(&data), S).unwrap();
        assert_eq!(plans.len(), eager.len());

        for (plan, shard) in plans.iter().zip(&eager) {
            let lazy = plan.materialize().unwrap();
            assert_eq!(lazy.piece_number, shard.piece_number);
            assert_eq!(lazy.length, shard.length);
            assert_eq!(lazy.sha1, shard.sha1);
            assert_eq!(lazy.payload, shard.payload);
        }
    }

    #[test]
    fn plan_for_zero_length_file_has_one_empty_piece() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let plans = plan_file(tmp.path(), S).unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].length, 0);
        let shard = plans[0].materialize().unwrap();
        assert_eq!(shard.length, 0);
    }

    #[test]
    fn materialize_fails_if_file_shrank() {
        let data = patterned(100);
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), &data).unwrap();
        let plans = plan_file(tmp.path(), 40).unwrap();
        assert_eq!(plans.len(), 3);

        std::fs::write(tmp.path(), &data[..50]).unwrap();
        assert!(plans[2].materialize().is_err());
    }

    #[test]
    fn hash_file_matches_in_memory_digest() {
        let data = patterned(5000);
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&data).unwrap();
        assert_eq!(hash_file(tmp.path()).unwrap(), Sha1Hash::compute(&data));
    }

    #[test]
    fn zero_shard_size_is_rejected() {
        assert!(shard_stream(&mut Cursor::new(b"x"), 0).is_err());
        assert!(plan_file(Path::new("/dev/null"), 0).is_err());
    }
}
