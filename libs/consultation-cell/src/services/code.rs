use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use rand::Rng;
use regex::Regex;
use uuid::Uuid;

const SUFFIX_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

static CODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(QH|DM)[0-9]{4}[A-Z0-9]{3}$").expect("valid code pattern"));

/// Two-letter code family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodePrefix {
    /// Consultation created from a confirmed appointment.
    Appointment,
    /// Consultation a doctor opened directly.
    Direct,
}

impl CodePrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodePrefix::Appointment => "QH",
            CodePrefix::Direct => "DM",
        }
    }
}

pub fn is_valid_code(code: &str) -> bool {
    CODE_PATTERN.is_match(code)
}

/// Day of month plus hour of the slot, e.g. `0710` for the 7th at 10:30.
pub fn appointment_context(date: NaiveDate, time: &str) -> String {
    let hour = NaiveTime::parse_from_str(time, "%H:%M")
        .map(|t| format!("{:02}", t.hour()))
        .unwrap_or_else(|_| "00".to_string());
    format!("{:02}{}", date.day(), hour)
}

/// Last two decimal digits of each id, zero-padded.
pub fn direct_context(doctor_id: &Uuid, patient_id: &Uuid) -> String {
    format!(
        "{}{}",
        last_two_digits(&doctor_id.to_string()),
        last_two_digits(&patient_id.to_string())
    )
}

fn last_two_digits(value: &str) -> String {
    let digits: Vec<char> = value.chars().filter(char::is_ascii_digit).collect();
    let tail: String = digits[digits.len().saturating_sub(2)..].iter().collect();
    format!("{:0>2}", tail)
}

fn random_suffix(rng: &mut impl Rng) -> String {
    (0..3)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

pub fn generate_code(prefix: CodePrefix, context: &str) -> String {
    let mut rng = rand::thread_rng();
    format!("{}{}{}", prefix.as_str(), context, random_suffix(&mut rng))
}

/// Same shape as `generate_code`, with the four context digits randomised too.
pub fn generate_escalated_code(prefix: CodePrefix) -> String {
    let mut rng = rand::thread_rng();
    let digits: u16 = rng.gen_range(0..10_000);
    format!("{}{:04}{}", prefix.as_str(), digits, random_suffix(&mut rng))
}

/// Candidate codes for one creation: `attempts` in the context space, then
/// `attempts` in the escalated space.
pub fn candidates(prefix: CodePrefix, context: String, attempts: u32) -> impl Iterator<Item = String> + Send {
    (0..attempts.saturating_mul(2)).map(move |i| {
        if i < attempts {
            generate_code(prefix, &context)
        } else {
            generate_escalated_code(prefix)
        }
    })
}
