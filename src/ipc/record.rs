use std::io;

use crate::error::{SimError, SimResult};
use crate::monitor::ViolationRecord;

/// Fixed on-wire record size in bytes. This layout is the
/// compatibility contract with the billing collaborators; readers must
/// consume whole records or fail.
pub const RECORD_LEN: usize = 136;

const AIRLINE_LEN: usize = 32;
const FLIGHT_LEN: usize = 16;
const DETAILS_LEN: usize = 64;

/// Message discriminator, first four little-endian bytes of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    AvnCreated = 1,
    PaymentRequest = 2,
    PaymentConfirmation = 3,
    QueryAvn = 4,
    QueryAirline = 5,
}

impl RecordType {
    fn from_u32(raw: u32) -> SimResult<Self> {
        match raw {
            1 => Ok(RecordType::AvnCreated),
            2 => Ok(RecordType::PaymentRequest),
            3 => Ok(RecordType::PaymentConfirmation),
            4 => Ok(RecordType::QueryAvn),
            5 => Ok(RecordType::QueryAirline),
            other => Err(invalid_record(format!("unknown record type {}", other))),
        }
    }
}

/// Wire-contract breaches are transport errors, not domain ones.
fn invalid_record(detail: String) -> SimError {
    SimError::IpcTransport(io::Error::new(io::ErrorKind::InvalidData, detail))
}

/// One fixed-size exchange unit between the core and a billing
/// collaborator. String fields are NUL-terminated ASCII, truncated to
/// their field width; integers are little-endian; `amount` carries the
/// recorded speed or payment amount depending on type.
#[derive(Debug, Clone, PartialEq)]
pub struct IpcRecord {
    pub record_type: RecordType,
    pub avn_id: u32,
    pub airline: String,
    pub flight: String,
    pub amount: f64,
    pub details: String,
    pub min_speed: i32,
    pub max_speed: i32,
}

impl IpcRecord {
    /// Outgoing notice for a freshly issued AVN.
    pub fn avn_created(record: &ViolationRecord) -> Self {
        Self {
            record_type: RecordType::AvnCreated,
            avn_id: record.avn_id,
            airline: record.airline.clone(),
            flight: record.flight_id.clone(),
            amount: record.recorded_speed,
            details: record.billed_class().to_string(),
            min_speed: record.min_speed as i32,
            max_speed: record.max_speed as i32,
        }
    }

    /// Operator-initiated payment submission.
    pub fn payment_request(avn_id: u32, airline: &str, flight: &str, amount: f64) -> Self {
        Self {
            record_type: RecordType::PaymentRequest,
            avn_id,
            airline: airline.to_string(),
            flight: flight.to_string(),
            amount,
            details: String::new(),
            min_speed: 0,
            max_speed: 0,
        }
    }

    /// Collaborator reply confirming a payment.
    pub fn payment_confirmation(avn_id: u32, amount: f64) -> Self {
        Self {
            record_type: RecordType::PaymentConfirmation,
            avn_id,
            airline: String::new(),
            flight: String::new(),
            amount,
            details: "PAID".to_string(),
            min_speed: 0,
            max_speed: 0,
        }
    }

    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        buf[0..4].copy_from_slice(&(self.record_type as u32).to_le_bytes());
        buf[4..8].copy_from_slice(&self.avn_id.to_le_bytes());
        write_str(&mut buf[8..8 + AIRLINE_LEN], &self.airline);
        write_str(&mut buf[40..40 + FLIGHT_LEN], &self.flight);
        buf[56..64].copy_from_slice(&self.amount.to_le_bytes());
        write_str(&mut buf[64..64 + DETAILS_LEN], &self.details);
        buf[128..132].copy_from_slice(&self.min_speed.to_le_bytes());
        buf[132..136].copy_from_slice(&self.max_speed.to_le_bytes());
        buf
    }

    /// Decode one whole record. Under-length input is rejected, not
    /// partially read.
    pub fn decode(buf: &[u8]) -> SimResult<Self> {
        if buf.len() < RECORD_LEN {
            return Err(invalid_record(format!(
                "record under-length: {} of {} bytes",
                buf.len(),
                RECORD_LEN
            )));
        }
        let record_type = RecordType::from_u32(u32::from_le_bytes(
            buf[0..4].try_into().expect("4-byte slice"),
        ))?;
        Ok(Self {
            record_type,
            avn_id: u32::from_le_bytes(buf[4..8].try_into().expect("4-byte slice")),
            airline: read_str(&buf[8..8 + AIRLINE_LEN]),
            flight: read_str(&buf[40..40 + FLIGHT_LEN]),
            amount: f64::from_le_bytes(buf[56..64].try_into().expect("8-byte slice")),
            details: read_str(&buf[64..64 + DETAILS_LEN]),
            min_speed: i32::from_le_bytes(buf[128..132].try_into().expect("4-byte slice")),
            max_speed: i32::from_le_bytes(buf[132..136].try_into().expect("4-byte slice")),
        })
    }
}

/// NUL-terminated ASCII write, truncating to the field width with one
/// byte reserved for the terminator.
fn write_str(field: &mut [u8], value: &str) {
    let max = field.len() - 1;
    for (i, b) in value.bytes().filter(u8::is_ascii).take(max).enumerate() {
        field[i] = b;
    }
}

fn read_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IpcRecord {
        IpcRecord {
            record_type: RecordType::AvnCreated,
            avn_id: 1042,
            airline: "Blue Dart".into(),
            flight: "BD1201".into(),
            amount: 650.5,
            details: "CARGO".into(),
            min_speed: 400,
            max_speed: 600,
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let record = sample();
        let bytes = record.encode();
        assert_eq!(bytes.len(), RECORD_LEN);
        let back = IpcRecord::decode(&bytes).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn layout_is_little_endian_at_fixed_offsets() {
        let bytes = sample().encode();
        assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 1042);
        assert_eq!(&bytes[8..17], b"Blue Dart");
        assert_eq!(bytes[17], 0);
        assert_eq!(&bytes[40..46], b"BD1201");
        assert_eq!(
            f64::from_le_bytes(bytes[56..64].try_into().unwrap()),
            650.5
        );
        assert_eq!(&bytes[64..69], b"CARGO");
        assert_eq!(i32::from_le_bytes(bytes[128..132].try_into().unwrap()), 400);
        assert_eq!(i32::from_le_bytes(bytes[132..136].try_into().unwrap()), 600);
    }

    #[test]
    fn long_strings_truncate_with_terminator() {
        let mut record = sample();
        record.airline = "A".repeat(100);
        record.flight = "F".repeat(40);
        let bytes = record.encode();
        let back = IpcRecord::decode(&bytes).unwrap();
        assert_eq!(back.airline.len(), 31);
        assert_eq!(back.flight.len(), 15);
    }

    #[test]
    fn under_length_rejected() {
        let bytes = sample().encode();
        assert!(IpcRecord::decode(&bytes[..RECORD_LEN - 1]).is_err());
        assert!(IpcRecord::decode(&[]).is_err());
    }

    #[test]
    fn unknown_type_rejected() {
        let mut bytes = sample().encode();
        bytes[0..4].copy_from_slice(&99u32.to_le_bytes());
        assert!(IpcRecord::decode(&bytes).is_err());
    }

    #[test]
    fn avn_created_from_violation_carries_bounds_and_class() {
        use crate::aircraft::{Aircraft, AircraftKind, Direction};
        use crate::monitor::SpeedMonitor;
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let mut rng = StdRng::seed_from_u64(21);
        let mut aircraft = Aircraft::new(
            "PA55".into(),
            "Pakistan Airforce".into(),
            AircraftKind::Emergency,
            Direction::North,
            &mut rng,
        );
        aircraft.set_speed(650.0);
        let mut monitor = SpeedMonitor::new();
        let violation = monitor.monitor(&mut aircraft).unwrap();

        let record = IpcRecord::avn_created(&violation);
        assert_eq!(record.record_type, RecordType::AvnCreated);
        assert_eq!(record.amount, 650.0);
        assert_eq!(record.details, "CARGO");
        assert_eq!(record.min_speed, 400);
        assert_eq!(record.max_speed, 600);
    }
}
