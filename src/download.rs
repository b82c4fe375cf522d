use crate::util::ensure_parent;
use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use std::fs::File;
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use tracing::{debug, info};

pub fn save_chunks<I>(chunks: I, dest: &Path) -> Result<u64>
where
    I: IntoIterator<Item = std::io::Result<Vec<u8>>>,
{
    ensure_parent(dest)?;
    let file = File::create(dest).with_context(|| format!("create {}", dest.display()))?;
    let mut out = BufWriter::new(file);
    let mut written = 0u64;
    for chunk in chunks {
        let chunk = chunk.with_context(|| "reading download stream")?;
        if chunk.is_empty() {
            continue;
        }
        out.write_all(&chunk)
            .with_context(|| format!("write {}", dest.display()))?;
        written += chunk.len() as u64;
    }
    out.flush()
        .with_context(|| format!("flush {}", dest.display()))?;
    Ok(written)
}

pub fn read_chunks<R: Read>(mut reader: R, chunk_size: usize) -> impl Iterator<Item = std::io::Result<Vec<u8>>> {
    let chunk_size = chunk_size.max(1);
    let mut done = false;
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        let mut buf = vec![0u8; chunk_size];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    done = true;
                    return None;
                }
                Ok(n) => {
                    buf.truncate(n);
                    return Some(Ok(buf));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    done = true;
                    return Some(Err(e));
                }
            }
        }
    })
}

pub fn download_to_file(client: &Client, url: &str, dest: &Path, chunk_size: usize) -> Result<u64> {
    debug!("downloading {url}");
    let resp = client
        .get(url)
        .send()
        .with_context(|| format!("GET {url}"))?;
    let status = resp.status();
    if !status.is_success() {
        bail!("download returned HTTP {}: {url}", status.as_u16());
    }
    let bytes = save_chunks(read_chunks(resp, chunk_size), dest)?;
    info!("file downloaded to {} ({bytes} bytes)", dest.display());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_chunks_respects_chunk_size() {
        let data = vec![7u8; 2500];
        let sizes: Vec<usize> = read_chunks(&data[..], 1024)
            .map(|c| c.unwrap().len())
            .collect();
        assert_eq!(sizes, vec![1024, 1024, 452]);
    }
}
