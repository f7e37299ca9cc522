//! Candidate port lists for the raw-socket sweep

/// Port list types for the connect sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortListType {
    /// Common service ports plus the 9000-9100 application range
    Common,
    /// Well-known ports most often found open on internet hosts
    Top,
    /// Union of both lists, common ports first
    Combined,
}

/// Common ports scanned by default
pub const COMMON_PORTS: &[u16] = &[
    21, 22, 23, 25, 53, 80, 110, 111, 135, 139, 143, 443, 993, 995,
    1723, 3306, 3389, 5432, 5900, 6000, 6001, 6002, 6003, 6004, 6005,
    6006, 6007, 6008, 6009, 8000, 8080, 8443, 8888, 9000, 9001, 9002,
    9003, 9004, 9005, 9006, 9007, 9008, 9009, 9010, 9011, 9012, 9013,
    9014, 9015, 9016, 9017, 9018, 9019, 9020, 9021, 9022, 9023, 9024,
    9025, 9026, 9027, 9028, 9029, 9030, 9031, 9032, 9033, 9034, 9035,
    9036, 9037, 9038, 9039, 9040, 9041, 9042, 9043, 9044, 9045, 9046,
    9047, 9048, 9049, 9050, 9051, 9052, 9053, 9054, 9055, 9056, 9057,
    9058, 9059, 9060, 9061, 9062, 9063, 9064, 9065, 9066, 9067, 9068,
    9069, 9070, 9071, 9072, 9073, 9074, 9075, 9076, 9077, 9078, 9079,
    9080, 9081, 9082, 9083, 9084, 9085, 9086, 9087, 9088, 9089, 9090,
    9091, 9092, 9093, 9094, 9095, 9096, 9097, 9098, 9099, 9100,
];

/// Well-known ports for the extended sweep
pub const TOP_PORTS: &[u16] = &[
    1, 3, 4, 6, 7, 9, 13, 17, 19, 20, 21, 22, 23, 24, 25, 26, 30, 32, 33,
    37, 42, 43, 49, 53, 70, 79, 80, 81, 82, 83, 84, 85, 88, 89, 90, 99,
    100, 106, 109, 110, 111, 113, 119, 125, 135, 139, 143, 144, 146, 161,
    163, 179, 199, 211, 212, 222, 254, 255, 256, 259, 264, 280, 301, 306,
    311, 340, 366, 389, 406, 407, 416, 417, 425, 427, 443, 444, 445, 458,
    464, 465, 481, 497, 500, 512, 513, 514, 515, 524, 541, 543, 544, 545,
    548, 554, 555, 563, 587, 593, 616, 617, 625, 631, 636, 646, 648, 666,
    667, 668, 683, 687, 691, 700, 705, 720, 749, 993, 995, 1025, 1026,
    1027, 1028, 1029, 1110, 1433, 1720, 1723, 1755, 1900, 2000, 2001,
    2049, 2121, 2717, 3000, 3128, 3306, 3389, 3986, 4899, 5000, 5009,
    5051, 5060, 5101, 5190, 5357, 5432, 5631, 5666, 5800, 5900, 6000,
    6001, 6646, 7070, 8000, 8008, 8009, 8080, 8081, 8443, 8888, 9100,
    9999, 10000, 32768, 49152, 49153, 49154, 49155, 49156, 49157,
];

/// Resolve a list type into an ordered, duplicate-free port list
pub fn get_port_list(list: PortListType) -> Vec<u16> {
    match list {
        PortListType::Common => COMMON_PORTS.to_vec(),
        PortListType::Top => TOP_PORTS.to_vec(),
        PortListType::Combined => {
            let mut seen = std::collections::HashSet::new();
            COMMON_PORTS
                .iter()
                .chain(TOP_PORTS.iter())
                .copied()
                .filter(|port| seen.insert(*port))
                .collect()
        }
    }
}
