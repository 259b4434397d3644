use adjoin_common::error::ExitCode;
use adjoin_topology::{classify, IpCommand, TcpProbe, Verdict};

use crate::cli::Cli;
use crate::commands::print_json;

pub fn topology(cli: &Cli) -> anyhow::Result<ExitCode> {
    let classification = classify(&IpCommand, &TcpProbe::default())?;

    if cli.json {
        print_json(&classification);
        return Ok(ExitCode::Success);
    }

    if classification.interfaces.is_empty() {
        println!("No IPv4 interfaces found");
    }
    for entry in &classification.interfaces {
        let verdict = match entry.verdict {
            Verdict::Isolated => "isolated",
            Verdict::External => "external",
            Verdict::Unknown => "unknown",
        };
        println!(
            "  {:<12} {:<18} {:<18} {}",
            entry.interface.name,
            format!("{}/{}", entry.interface.address, entry.interface.prefix),
            entry.network,
            verdict
        );
    }
    println!("hosts allow = {}", classification.allow_list.join(" "));
    Ok(ExitCode::Success)
}
