//! Streamed cipher driver.
//!
//! Transforms a possibly very large byte-stream object end-to-end through an
//! AEAD context without requiring the whole object in memory at once. The
//! output backing is chosen by predicted ciphertext size: small outputs are
//! materialized in memory, large ones (or memory-pool failures) spill to a
//! temp file, pacing writes so a tight loop of small conversions does not
//! saturate the filesystem.

use crate::crypto::{CipherSuite, CryptContext, Direction};
use crate::error::{SecError, SecResult};
use crate::sci::util::CipherParms;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

/// Buffering policy for the driver.
#[derive(Debug, Clone)]
pub struct StreamPolicy {
    /// Average filesystem transmit rate in bytes per second.
    pub xmit_rate: u64,
    /// How many temp files per second the filesystem should absorb.
    pub max_temp_files_per_sec: u64,
    /// Largest output the in-memory pool will accept; exceeding it fails the
    /// memory path and falls through to the file path.
    pub mem_ceiling: u64,
    /// Directory holding spill files.
    pub tmp_dir: PathBuf,
}

impl StreamPolicy {
    /// Outputs below this size are attempted in memory first.
    pub fn min_file_buffer(&self) -> u64 {
        self.xmit_rate / self.max_temp_files_per_sec
    }
}

impl Default for StreamPolicy {
    fn default() -> Self {
        StreamPolicy {
            xmit_rate: 40_000_000,
            max_temp_files_per_sec: 20,
            mem_ceiling: 1 << 30,
            tmp_dir: std::env::temp_dir(),
        }
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn tmp_path(dir: &PathBuf) -> PathBuf {
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    dir.join(format!("bp7sec-{}-{}.tmp", std::process::id(), n))
}

#[derive(Debug)]
enum Backing {
    Memory(Vec<u8>),
    File { file: File, path: PathBuf, len: u64 },
}

/// A byte-stream object backed by memory or a temp file.
///
/// There is exactly one live owner of any stream object; transformations
/// consume their input and hand back a new object. File backings are
/// removed from disk when the object is dropped.
#[derive(Debug)]
pub struct StreamObject {
    backing: Backing,
}

impl StreamObject {
    pub fn from_vec(data: Vec<u8>) -> StreamObject {
        StreamObject {
            backing: Backing::Memory(data),
        }
    }

    pub fn len(&self) -> u64 {
        match &self.backing {
            Backing::Memory(v) => v.len() as u64,
            Backing::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_file_backed(&self) -> bool {
        matches!(self.backing, Backing::File { .. })
    }

    /// Materialize the stream contents, consuming the object.
    pub fn into_vec(mut self) -> SecResult<Vec<u8>> {
        match &mut self.backing {
            Backing::Memory(v) => Ok(std::mem::take(v)),
            Backing::File { file, len, .. } => {
                file.seek(SeekFrom::Start(0))?;
                let mut out = Vec::with_capacity(*len as usize);
                file.read_to_end(&mut out)?;
                Ok(out)
            }
        }
    }

    fn rewind(&mut self) -> SecResult<()> {
        if let Backing::File { file, .. } = &mut self.backing {
            file.seek(SeekFrom::Start(0))?;
        }
        Ok(())
    }

    fn read_chunk(&mut self, offset: &mut u64, buf: &mut [u8]) -> SecResult<usize> {
        match &mut self.backing {
            Backing::Memory(v) => {
                let start = *offset as usize;
                let n = buf.len().min(v.len().saturating_sub(start));
                buf[..n].copy_from_slice(&v[start..start + n]);
                *offset += n as u64;
                Ok(n)
            }
            Backing::File { file, .. } => {
                let n = file.read(buf)?;
                *offset += n as u64;
                Ok(n)
            }
        }
    }
}

impl Drop for StreamObject {
    fn drop(&mut self) {
        if let Backing::File { path, .. } = &self.backing {
            let _ = std::fs::remove_file(path);
        }
    }
}

enum OutBacking {
    Memory { buf: Vec<u8>, ceiling: u64 },
    File { file: File, path: PathBuf, len: u64 },
}

impl OutBacking {
    fn write(&mut self, data: &[u8]) -> SecResult<()> {
        match self {
            OutBacking::Memory { buf, ceiling } => {
                if (buf.len() + data.len()) as u64 > *ceiling {
                    return Err(SecError::Crypto("memory pool exhausted".to_string()));
                }
                buf.extend_from_slice(data);
                Ok(())
            }
            OutBacking::File { file, len, .. } => {
                file.write_all(data)?;
                *len += data.len() as u64;
                Ok(())
            }
        }
    }

    fn into_object(self) -> StreamObject {
        match self {
            OutBacking::Memory { buf, .. } => StreamObject::from_vec(buf),
            OutBacking::File { file, path, len } => StreamObject {
                backing: Backing::File { file, path, len },
            },
        }
    }
}

fn file_backing(policy: &StreamPolicy) -> SecResult<OutBacking> {
    let path = tmp_path(&policy.tmp_dir);
    let file = OpenOptions::new()
        .create_new(true)
        .read(true)
        .write(true)
        .open(&path)?;
    Ok(OutBacking::File { file, path, len: 0 })
}

fn run_pass(
    suite: CipherSuite,
    direction: Direction,
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    expected_tag: Option<&[u8]>,
    input: &mut StreamObject,
    out: &mut OutBacking,
) -> SecResult<Option<Vec<u8>>> {
    let mut ctx = CryptContext::init(suite, key, direction)?;
    ctx.start(iv, aad)?;

    input.rewind()?;
    let mut offset: u64 = 0;
    let mut chunk = vec![0u8; suite.chunk_size()];
    loop {
        let n = input.read_chunk(&mut offset, &mut chunk)?;
        if n == 0 {
            break;
        }
        let ready = ctx.update(&chunk[..n])?;
        if !ready.is_empty() {
            out.write(&ready)?;
        }
    }

    let (data, tag) = ctx.finish(expected_tag)?;
    out.write(&data)?;
    Ok(tag)
}

/// Transform `input` end-to-end through the given suite and direction,
/// returning the new stream object and, when encrypting, the produced
/// authentication tag.
///
/// The input object is consumed either way; on any failure every partially
/// allocated resource is released before the error is returned, so a
/// half-built output object is never reachable.
pub fn convert(
    suite: CipherSuite,
    direction: Direction,
    key: &[u8],
    parms: &CipherParms,
    mut input: StreamObject,
    policy: &StreamPolicy,
) -> SecResult<(StreamObject, Option<Vec<u8>>)> {
    let bytes_remaining = input.len();
    if bytes_remaining == 0 {
        return Err(SecError::EmptyStream);
    }

    let iv = parms.iv.as_deref().ok_or(SecError::MissingParm("iv"))?;
    let aad = parms.aad.clone().unwrap_or_default();
    let expected_tag = match direction {
        Direction::Encrypt => None,
        Direction::Decrypt => Some(
            parms
                .icv
                .as_deref()
                .ok_or(SecError::MissingResult("icv"))?,
        ),
    };

    let predicted = suite.crypt_res_len(bytes_remaining, direction);
    if predicted == 0 {
        return Err(SecError::Crypto(format!(
            "predicted bad output length {}",
            predicted
        )));
    }

    let threshold = policy.min_file_buffer();
    let mut mem_attempted = false;

    // Fast path: keep the output in memory when the prediction says it fits.
    if predicted < threshold {
        mem_attempted = true;
        let mut out = OutBacking::Memory {
            buf: Vec::new(),
            ceiling: policy.mem_ceiling,
        };
        match run_pass(
            suite,
            direction,
            key,
            iv,
            &aad,
            expected_tag,
            &mut input,
            &mut out,
        ) {
            Ok(tag) => return Ok((out.into_object(), tag)),
            Err(SecError::AuthFailed) => return Err(SecError::AuthFailed),
            Err(err) => {
                log::warn!(
                    "in-memory conversion of {} bytes failed ({}), spilling to file",
                    predicted,
                    err
                );
            }
        }
    }

    if mem_attempted {
        // Slow down to avoid over-stressing the file system with a burst of
        // small spill files.
        let siesta_bytes = threshold - predicted;
        let siesta_usec = (1_000_000u128 * siesta_bytes as u128) / policy.xmit_rate as u128;
        thread::sleep(Duration::from_micros(siesta_usec as u64));
    }

    let mut out = file_backing(policy)?;
    let tag = run_pass(
        suite,
        direction,
        key,
        iv,
        &aad,
        expected_tag,
        &mut input,
        &mut out,
    )?;
    Ok((out.into_object(), tag))
}
