use std::fs;
use std::path::Path;

use devlink_peer::{chunk_count, CHUNK_SIZE};
use serde::Serialize;

use crate::cmd::WriteArgs;
use crate::exit::{io_error, peer_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_record, OutputFormat, Record};

#[derive(Serialize)]
struct WriteOutput {
    link: String,
    chunks: usize,
    sent_bytes: usize,
    dropped_bytes: usize,
    metadata_bytes: usize,
}

impl Record for WriteOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("link", self.link.clone()),
            ("chunks", self.chunks.to_string()),
            ("sent_bytes", self.sent_bytes.to_string()),
            ("dropped_bytes", self.dropped_bytes.to_string()),
            ("metadata_bytes", self.metadata_bytes.to_string()),
        ]
    }
}

pub fn run(args: WriteArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = load(&args.file)?;
    let metadata = resolve_metadata(&args)?;

    let chunks = chunk_count(payload.len());
    let dropped_bytes = payload.len() % CHUNK_SIZE;
    if dropped_bytes > 0 {
        eprintln!(
            "warning: {} is not a multiple of {CHUNK_SIZE} bytes; \
             the last {dropped_bytes} bytes will not be sent",
            args.file.display()
        );
    }

    let mut link = args.link.open()?;
    link.send(&metadata, &payload)
        .map_err(|err| peer_error("write failed", err))?;

    let out = WriteOutput {
        link: link.label.clone(),
        chunks,
        sent_bytes: chunks * CHUNK_SIZE,
        dropped_bytes,
        metadata_bytes: metadata.len(),
    };
    print_record(&out, format);
    Ok(SUCCESS)
}

fn resolve_metadata(args: &WriteArgs) -> CliResult<Vec<u8>> {
    if let Some(path) = &args.meta {
        return load(path);
    }
    if let Some(hex) = &args.meta_hex {
        return parse_hex(hex);
    }
    Ok(Vec::new())
}

fn load(path: &Path) -> CliResult<Vec<u8>> {
    fs::read(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))
}

fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "--meta-hex needs an even number of digits"));
    }
    digits
        .chunks_exact(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| {
                    CliError::new(USAGE, format!("--meta-hex is not valid hex: {input}"))
                })
        })
        .collect()
}
