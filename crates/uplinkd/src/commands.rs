//! One-shot operator commands.

use std::process::ExitCode;

use anyhow::Context;

use uplink_controller::{CycleReport, Direction, FailoverController};
use uplink_core::UplinkConfig;

pub async fn cycle(controller: &FailoverController, json: bool) -> anyhow::Result<ExitCode> {
    let report = controller.run_cycle().await;
    print_report(&report, json)?;
    Ok(exit_code(&report))
}

pub async fn force(controller: &FailoverController, direction: Direction) -> ExitCode {
    let report = controller.force(direction).await;
    println!("{report}");
    exit_code(&report)
}

pub async fn status(controller: &FailoverController, json: bool) -> anyhow::Result<ExitCode> {
    let status = controller
        .status()
        .await
        .context("reading routing state")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        match &status.route_id {
            Some(id) => println!("{} (route {id})", status.state),
            None => println!("{}", status.state),
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn check(controller: &FailoverController) -> anyhow::Result<ExitCode> {
    let check = controller.check().await.context("device check failed")?;
    println!("virtual router: {}", check.virtual_router_id);
    println!(
        "interface:      {} ({})",
        check.interface_name, check.interface_id
    );
    Ok(ExitCode::SUCCESS)
}

pub fn init_config() -> anyhow::Result<()> {
    let scaffold = UplinkConfig::scaffold().to_toml_string()?;
    print!("{scaffold}");
    Ok(())
}

fn print_report(report: &CycleReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn exit_code(report: &CycleReport) -> ExitCode {
    ExitCode::from(u8::try_from(report.exit_code()).unwrap_or(1))
}
