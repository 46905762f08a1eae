pub mod connection;
pub mod link;
pub mod terminal;

/// Shown in the port selector when nothing is enumerable on this machine.
pub const FALLBACK_PORTS: &[&str] = &["COM1", "COM2", "COM3", "COM4"];

pub fn serial_port_list() -> Vec<String> {
    let ports = serialport::available_ports().unwrap_or_default();
    if ports.is_empty() {
        return FALLBACK_PORTS.iter().map(|p| p.to_string()).collect();
    }
    ports.into_iter().map(|p| p.port_name).collect()
}
