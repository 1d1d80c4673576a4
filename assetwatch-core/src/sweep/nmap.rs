//! Sweep backed by the `nmap` binary and its XML report.

use super::{BulkSweep, SweptHost};
use crate::error::SweepError;
use async_trait::async_trait;
use ipnet::Ipv4Net;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NmapSweepConfig {
    /// Program name or path of the nmap binary.
    pub program: String,
    pub timeout_secs: u64,
    /// Ports to connect-scan for classification evidence. Empty means
    /// host discovery only.
    pub ports: Vec<u16>,
}

impl Default for NmapSweepConfig {
    fn default() -> Self {
        Self {
            program: "nmap".to_string(),
            timeout_secs: 300,
            ports: Vec::new(),
        }
    }
}

pub struct NmapSweep {
    config: NmapSweepConfig,
}

impl NmapSweep {
    pub fn new(config: NmapSweepConfig) -> Self {
        Self { config }
    }

    fn arguments(&self, block: &Ipv4Net) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        if self.config.ports.is_empty() {
            args.push("-sn".into());
        } else {
            let ports: Vec<String> = self.config.ports.iter().map(u16::to_string).collect();
            args.extend(["-sT".into(), "-p".into(), ports.join(",")]);
        }
        args.extend([
            "-T4".into(),
            "--max-retries".into(),
            "1".into(),
            "-oX".into(),
            "-".into(),
            block.to_string(),
        ]);
        args
    }
}

#[async_trait]
impl BulkSweep for NmapSweep {
    fn name(&self) -> &'static str {
        "nmap"
    }

    async fn sweep(&self, block: &Ipv4Net) -> Result<Vec<SweptHost>, SweepError> {
        let args = self.arguments(block);
        tracing::debug!(program = %self.config.program, ?args, "launching nmap");

        let limit = Duration::from_secs(self.config.timeout_secs);
        let child = Command::new(&self.config.program)
            .args(&args)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(limit, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(SweepError::Spawn {
                    program: self.config.program.clone(),
                    source,
                })
            }
            Err(_) => return Err(SweepError::Timeout(limit)),
        };

        if !output.status.success() {
            return Err(SweepError::NonZeroExit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_nmap_xml(&output.stdout, !self.config.ports.is_empty())
    }
}

/// Parses an nmap `-oX` report. Only hosts whose status is `up` are returned.
///
/// When `with_ports` is set every host carries a (possibly empty) open-port
/// set; otherwise `open_ports` stays `None`.
pub fn parse_nmap_xml(xml: &[u8], with_ports: bool) -> Result<Vec<SweptHost>, SweepError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut hosts = Vec::new();
    let mut seen_root = false;
    let mut current: Option<(SweptHost, bool)> = None;
    let mut current_port: Option<u16> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| SweepError::Parse(e.to_string()))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.name().as_ref() {
                    b"nmaprun" => seen_root = true,
                    b"host" if !is_empty => {
                        let mut host = SweptHost::default();
                        if with_ports {
                            host.open_ports = Some(BTreeSet::new());
                        }
                        current = Some((host, false));
                    }
                    b"status" => {
                        if let Some((_, up)) = current.as_mut() {
                            *up = attribute(e, &reader, b"state")?.as_deref() == Some("up");
                        }
                    }
                    b"address" => {
                        if let Some((host, _)) = current.as_mut() {
                            apply_address(host, e, &reader)?;
                        }
                    }
                    b"hostname" => {
                        if let Some((host, _)) = current.as_mut() {
                            if host.hostname.is_none() {
                                host.hostname = attribute(e, &reader, b"name")?;
                            }
                        }
                    }
                    b"port" => {
                        current_port = attribute(e, &reader, b"portid")?
                            .and_then(|p| p.parse().ok());
                    }
                    b"state" => {
                        let open = attribute(e, &reader, b"state")?.as_deref() == Some("open");
                        if let (Some((host, _)), Some(port), true) =
                            (current.as_mut(), current_port, open)
                        {
                            host.open_ports.get_or_insert_with(BTreeSet::new).insert(port);
                        }
                    }
                    _ => {}
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"host" => {
                    if let Some((host, true)) = current.take() {
                        hosts.push(host);
                    }
                }
                b"port" => current_port = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(SweepError::Parse("missing <nmaprun> root element".to_string()));
    }
    Ok(hosts)
}

fn apply_address(
    host: &mut SweptHost,
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<(), SweepError> {
    let Some(addr) = attribute(e, reader, b"addr")? else {
        return Ok(());
    };
    match attribute(e, reader, b"addrtype")?.as_deref() {
        Some("ipv4") => {
            host.address = Some(
                addr.parse()
                    .map_err(|_| SweepError::Parse(format!("bad ipv4 address '{addr}'")))?,
            );
        }
        Some("mac") => {
            host.hardware_address = Some(addr);
            host.vendor = attribute(e, reader, b"vendor")?;
        }
        _ => {}
    }
    Ok(())
}

fn attribute(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
    key: &[u8],
) -> Result<Option<String>, SweepError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| SweepError::Parse(e.to_string()))?;
        if attr.key.as_ref() == key {
            let value = attr
                .decode_and_unescape_value(reader.decoder())
                .map_err(|e| SweepError::Parse(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nmaprun>
<nmaprun scanner="nmap" args="nmap -sn -T4 -oX - 192.168.1.0/24">
<host><status state="up" reason="arp-response"/>
<address addr="192.168.1.1" addrtype="ipv4"/>
<address addr="00:1C:C0:11:22:33" addrtype="mac" vendor="Cisco Systems"/>
<hostnames><hostname name="gw.lan" type="PTR"/></hostnames>
</host>
<host><status state="up" reason="arp-response"/>
<address addr="192.168.1.20" addrtype="ipv4"/>
<hostnames/>
</host>
<host><status state="down" reason="no-response"/>
<address addr="192.168.1.30" addrtype="ipv4"/>
</host>
<runstats><finished elapsed="2.05"/><hosts up="2" down="1" total="3"/></runstats>
</nmaprun>"#;

    #[test]
    fn test_parse_discovery_report() {
        let hosts = parse_nmap_xml(REPORT.as_bytes(), false).unwrap();
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].address, Some("192.168.1.1".parse().unwrap()));
        assert_eq!(hosts[0].hardware_address.as_deref(), Some("00:1C:C0:11:22:33"));
        assert_eq!(hosts[0].vendor.as_deref(), Some("Cisco Systems"));
        assert_eq!(hosts[0].hostname.as_deref(), Some("gw.lan"));
        assert_eq!(hosts[0].open_ports, None);
        assert_eq!(hosts[1].hardware_address, None);
        assert_eq!(hosts[1].hostname, None);
    }

    #[test]
    fn test_parse_port_report() {
        let xml = r#"<nmaprun>
<host><status state="up"/><address addr="10.0.0.5" addrtype="ipv4"/>
<ports>
<port protocol="tcp" portid="22"><state state="closed"/></port>
<port protocol="tcp" portid="80"><state state="open"/><service name="http"/></port>
<port protocol="tcp" portid="9100"><state state="open"/></port>
</ports></host>
<host><status state="up"/><address addr="10.0.0.6" addrtype="ipv4"/><ports/></host>
</nmaprun>"#;
        let hosts = parse_nmap_xml(xml.as_bytes(), true).unwrap();
        assert_eq!(hosts.len(), 2);
        let ports: Vec<u16> = hosts[0].open_ports.clone().unwrap().into_iter().collect();
        assert_eq!(ports, vec![80, 9100]);
        assert_eq!(hosts[1].open_ports, Some(BTreeSet::new()));
    }

    #[test]
    fn test_empty_report_is_not_an_error() {
        let xml = r#"<nmaprun><runstats><hosts up="0" down="256" total="256"/></runstats></nmaprun>"#;
        assert!(parse_nmap_xml(xml.as_bytes(), false).unwrap().is_empty());
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        assert!(matches!(
            parse_nmap_xml(b"Starting Nmap 7.94", false),
            Err(SweepError::Parse(_))
        ));
    }

    #[test]
    fn test_arguments() {
        let sweep = NmapSweep::new(NmapSweepConfig {
            ports: vec![22, 9100],
            ..Default::default()
        });
        let block: Ipv4Net = "10.0.0.0/24".parse().unwrap();
        assert_eq!(
            sweep.arguments(&block),
            ["-sT", "-p", "22,9100", "-T4", "--max-retries", "1", "-oX", "-", "10.0.0.0/24"]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_spawn_error() {
        let sweep = NmapSweep::new(NmapSweepConfig {
            program: "/nonexistent/nmap-binary".into(),
            ..Default::default()
        });
        let block: Ipv4Net = "10.0.0.0/30".parse().unwrap();
        assert!(matches!(sweep.sweep(&block).await, Err(SweepError::Spawn { .. })));
    }
}
