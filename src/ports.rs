//! Serial port discovery

use anyhow::{Context, Result};
use serde::Serialize;
use tokio_serial::SerialPortType;

/// Port name that means "pick one for me"
pub const AUTO_PORT: &str = "auto";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub name: String,
    /// `usb`, `bluetooth`, `pci` or `unknown`
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Serial ports currently present on the system, in enumeration order
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = tokio_serial::available_ports().context("Failed to enumerate serial ports")?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let (kind, description) = match p.port_type {
                SerialPortType::UsbPort(usb) => {
                    let desc = match (usb.manufacturer, usb.product) {
                        (Some(m), Some(p)) => Some(format!("{} {}", m, p)),
                        (m, p) => m.or(p),
                    };
                    ("usb", desc.or_else(|| Some(format!("{:04x}:{:04x}", usb.vid, usb.pid))))
                }
                SerialPortType::BluetoothPort => ("bluetooth", None),
                SerialPortType::PciPort => ("pci", None),
                SerialPortType::Unknown => ("unknown", None),
            };
            PortInfo {
                name: p.port_name,
                kind,
                description,
            }
        })
        .collect())
}

/// Resolve a configured port name against what is present.
///
/// `auto` (any case) picks the last enumerated port, which is usually the
/// most recently attached USB adapter. Any other name is returned as-is;
/// opening it reports whether it exists.
pub fn resolve_port(requested: &str) -> Result<String> {
    if !requested.trim().eq_ignore_ascii_case(AUTO_PORT) {
        return Ok(requested.trim().to_string());
    }

    let names: Vec<String> = list_ports()?.into_iter().map(|p| p.name).collect();
    pick_port(requested, &names)
        .with_context(|| "No serial ports found for 'auto' selection".to_string())
}

/// Print the port list for `--list-ports`
pub fn list_ports_formatted() {
    use colored::*;

    println!("\n{}", "=== Available Serial Ports ===".bold().cyan());

    let ports = match list_ports() {
        Ok(ports) => ports,
        Err(e) => {
            println!("  {}", format!("{:#}", e).red());
            return;
        }
    };

    if ports.is_empty() {
        println!("  {}", "No serial ports found".dimmed());
        return;
    }

    for port in &ports {
        let marker = match port.kind {
            "usb" => "[USB]".green(),
            "bluetooth" => "[BT]".blue(),
            other => format!("[{}]", other.to_uppercase()).yellow(),
        };
        match &port.description {
            Some(desc) => println!("  {} {} {}", marker, port.name, desc.dimmed()),
            None => println!("  {} {}", marker, port.name),
        }
    }

    if let Some(last) = ports.last() {
        println!("\n{}", "'auto' would select:".bold());
        println!("  {}", last.name.bright_white());
    }
}

fn pick_port(requested: &str, available: &[String]) -> Option<String> {
    if requested.trim().eq_ignore_ascii_case(AUTO_PORT) {
        available.last().cloned()
    } else {
        Some(requested.trim().to_string())
    }
}
