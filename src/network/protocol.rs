//! Static port → service label lookup

use std::collections::HashMap;
use std::sync::Arc;

/// Service database keyed by well-known port numbers.
///
/// Cheap to clone; every probe unit carries its own handle.
#[derive(Debug, Clone)]
pub struct ServiceDatabase {
    tcp_services: Arc<HashMap<u16, String>>,
}

impl ServiceDatabase {
    pub fn new() -> Self {
        let mut tcp_services = HashMap::new();

        tcp_services.insert(21, "FTP");
        tcp_services.insert(22, "SSH");
        tcp_services.insert(23, "Telnet");
        tcp_services.insert(25, "SMTP");
        tcp_services.insert(53, "DNS");
        tcp_services.insert(80, "HTTP");
        tcp_services.insert(110, "POP3");
        tcp_services.insert(111, "RPC");
        tcp_services.insert(135, "RPC");
        tcp_services.insert(139, "NetBIOS");
        tcp_services.insert(143, "IMAP");
        tcp_services.insert(443, "HTTPS");
        tcp_services.insert(445, "SMB");
        tcp_services.insert(465, "SMTPS");
        tcp_services.insert(587, "Submission");
        tcp_services.insert(993, "IMAPS");
        tcp_services.insert(995, "POP3S");
        tcp_services.insert(1433, "MSSQL");
        tcp_services.insert(1521, "Oracle");
        tcp_services.insert(3306, "MySQL");
        tcp_services.insert(3389, "RDP");
        tcp_services.insert(5432, "PostgreSQL");
        tcp_services.insert(5900, "VNC");
        tcp_services.insert(6000, "X11");
        tcp_services.insert(6379, "Redis");
        tcp_services.insert(8000, "HTTP-Alt");
        tcp_services.insert(8080, "HTTP-Proxy");
        tcp_services.insert(8443, "HTTPS-Alt");
        tcp_services.insert(8888, "HTTP-Alt");
        tcp_services.insert(27017, "MongoDB");

        Self::from_entries(tcp_services)
    }

    /// Build a database from an explicit table, replacing the defaults
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u16, S)>,
        S: Into<String>,
    {
        Self {
            tcp_services: Arc::new(
                entries
                    .into_iter()
                    .map(|(port, name)| (port, name.into()))
                    .collect(),
            ),
        }
    }

    pub fn get_tcp_service(&self, port: u16) -> Option<&str> {
        self.tcp_services.get(&port).map(String::as_str)
    }

    /// Label used on port records: the table entry or `Unknown`
    pub fn label(&self, port: u16) -> String {
        self.get_tcp_service(port).unwrap_or("Unknown").to_string()
    }

    pub fn len(&self) -> usize {
        self.tcp_services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tcp_services.is_empty()
    }
}

impl Default for ServiceDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_labels() {
        let db = ServiceDatabase::new();
        assert_eq!(db.label(22), "SSH");
        assert_eq!(db.label(8443), "HTTPS-Alt");
        assert_eq!(db.label(31337), "Unknown");
        assert_eq!(db.get_tcp_service(31337), None);
    }

    #[test]
    fn test_custom_table() {
        let db = ServiceDatabase::from_entries([(4022, "SSH")]);
        assert_eq!(db.len(), 1);
        assert_eq!(db.label(4022), "SSH");
        assert_eq!(db.label(22), "Unknown");
    }
}
