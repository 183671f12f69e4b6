//! Intelligence records produced by payload inspection, and the sink they
//! are handed to.

use chrono::{DateTime, Utc};
use smoltcp::wire::EthernetAddress;
use std::io::Write;
use std::net::IpAddr;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Transport ports of an inspected packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ports {
    Tcp { src: u16, dst: u16 },
    Udp { src: u16, dst: u16 },
}

/// One observation about one inspected packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intel {
    pub src_mac: EthernetAddress,
    pub dst_mac: EthernetAddress,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub ports: Ports,
    /// Frame size in bytes.
    pub size: usize,
    /// When the PacketIn carrying the frame arrived.
    pub timestamp: DateTime<Utc>,
    /// Pattern matches in order of occurrence.
    pub detail: Vec<String>,
}

impl Intel {
    /// Format as one CSV line:
    /// `timestamp_ns,src_mac,dst_mac,src_ip,dst_ip,src_tcp,dst_tcp,src_udp,dst_udp,size,detail`.
    ///
    /// Unused port columns are 0.
    pub fn to_csv(&self) -> String {
        let (src_tcp, dst_tcp, src_udp, dst_udp) = match self.ports {
            Ports::Tcp { src, dst } => (src, dst, 0, 0),
            Ports::Udp { src, dst } => (0, 0, src, dst),
        };
        format!(
            "{},{},{},{},{},{},{},{},{},{},{}",
            self.timestamp.timestamp_nanos_opt().unwrap_or_default(),
            format_mac(self.src_mac),
            format_mac(self.dst_mac),
            self.src_ip,
            self.dst_ip,
            src_tcp,
            dst_tcp,
            src_udp,
            dst_udp,
            self.size,
            csv_quote(&self.detail.join(" ")),
        )
    }
}

/// `aa:bb:cc:dd:ee:ff`, independent of smoltcp's display format.
pub fn format_mac(mac: EthernetAddress) -> String {
    let b = mac.0;
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        b[0], b[1], b[2], b[3], b[4], b[5]
    )
}

fn csv_quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// An ordered collection of Intel records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    intels: Vec<Intel>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_intel(&mut self, intel: Intel) {
        self.intels.push(intel);
    }

    pub fn intels(&self) -> &[Intel] {
        &self.intels
    }

    pub fn len(&self) -> usize {
        self.intels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intels.is_empty()
    }
}

impl From<Intel> for Report {
    fn from(intel: Intel) -> Self {
        Self {
            intels: vec![intel],
        }
    }
}

/// Destination for completed reports. Called concurrently from independent
/// connection loops.
pub trait ReportSink: Send + Sync {
    fn add(&self, report: Report);
}

/// Writes each Intel as a CSV line to a writer (file, stdout, ...).
pub struct CsvReportSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> CsvReportSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consume the sink and return the writer.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send> ReportSink for CsvReportSink<W> {
    fn add(&self, report: Report) {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for intel in report.intels() {
            if let Err(e) = writeln!(writer, "{}", intel.to_csv()) {
                warn!(error = %e, "Failed to write intel");
                break;
            }
        }
        if let Err(e) = writer.flush() {
            warn!(error = %e, "Failed to flush report sink");
        }
        debug!(intels = report.len(), "Report written");
    }
}
