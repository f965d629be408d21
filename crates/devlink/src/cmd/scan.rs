use devlink_transport::{scan, subnet_hosts, ScanConfig};
use serde::Serialize;

use crate::cmd::{parse_duration, ScanArgs};
use crate::exit::{CliResult, FAILURE, SUCCESS};
use crate::output::{print_record, OutputFormat, Record};

#[derive(Serialize)]
struct ScanOutput {
    subnet: String,
    port: u16,
    probed: usize,
    responders: Vec<String>,
}

impl Record for ScanOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("subnet", self.subnet.clone()),
            ("port", self.port.to_string()),
            ("probed", self.probed.to_string()),
            ("responders", self.responders.join(",")),
        ]
    }
}

/// Exits with FAILURE when no host responds.
pub fn run(args: ScanArgs, format: OutputFormat) -> CliResult<i32> {
    let config = ScanConfig {
        timeout: parse_duration(&args.timeout)?,
        workers: args.workers,
    };
    let hosts = subnet_hosts(args.subnet);
    let [a, b, c, _] = args.subnet.octets();

    let responders = scan(&hosts, args.port, &config);
    let out = ScanOutput {
        subnet: format!("{a}.{b}.{c}.0/24"),
        port: args.port,
        probed: hosts.len(),
        responders: responders.iter().map(ToString::to_string).collect(),
    };
    print_record(&out, format);

    if responders.is_empty() {
        Ok(FAILURE)
    } else {
        Ok(SUCCESS)
    }
}
