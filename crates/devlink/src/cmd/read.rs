use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::cmd::ReadArgs;
use crate::exit::{io_error, peer_error, CliResult, SUCCESS};
use crate::output::{metadata_preview, print_record, OutputFormat, Record};

#[derive(Serialize)]
struct ReadOutput {
    link: String,
    chunks: u16,
    data_bytes: usize,
    metadata: String,
    out: Option<String>,
    meta_out: Option<String>,
}

impl Record for ReadOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("link", self.link.clone()),
            ("chunks", self.chunks.to_string()),
            ("data_bytes", self.data_bytes.to_string()),
            ("metadata", self.metadata.clone()),
            ("out", self.out.clone().unwrap_or_else(|| "-".into())),
            ("meta_out", self.meta_out.clone().unwrap_or_else(|| "-".into())),
        ]
    }
}

pub fn run(args: ReadArgs, format: OutputFormat) -> CliResult<i32> {
    let mut link = args.link.open()?;
    let received = link
        .recv()
        .map_err(|err| peer_error("read failed", err))?;

    if let Some(path) = &args.out {
        save(path, &received.data)?;
    }
    if let Some(path) = &args.meta_out {
        save(path, &received.metadata)?;
    }

    let out = ReadOutput {
        link: link.label.clone(),
        chunks: received.chunk_count,
        data_bytes: received.data.len(),
        metadata: metadata_preview(&received.metadata),
        out: args.out.as_ref().map(|p| p.display().to_string()),
        meta_out: args.meta_out.as_ref().map(|p| p.display().to_string()),
    };
    print_record(&out, format);
    Ok(SUCCESS)
}

fn save(path: &Path, data: &[u8]) -> CliResult<()> {
    fs::write(path, data)
        .map_err(|err| io_error(&format!("failed writing {}", path.display()), err))
}
