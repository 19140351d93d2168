//! Development roster seeding
//!
//! Appends randomly named entries that activate immediately, so a fresh
//! environment has something to provision on the next pass.

use super::{RosterError, RosterRecord};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::path::Path;

const VOWELS: &[u8] = b"aeiou";
const CONSONANTS: &[u8] = b"bcdfghjklmnpqrstvwxyz";

/// Alternating consonant/vowel word of the given length.
fn generate_word<R: Rng>(rng: &mut R, length: usize) -> String {
    (0..length)
        .map(|i| {
            let pool = if i % 2 == 0 { CONSONANTS } else { VOWELS };
            char::from(pool[rng.random_range(0..pool.len())])
        })
        .collect()
}

pub fn generate_entries<R: Rng>(rng: &mut R, count: usize, now: DateTime<Utc>) -> Vec<RosterRecord> {
    let date_start = now.format("%Y-%m-%dT%H:%M:%SZ").to_string();
    (0..count)
        .map(|_| {
            let given_len = rng.random_range(5..=15);
            let family_len = rng.random_range(5..=25);
            let user_len = rng.random_range(4..=10);
            let domain_len = rng.random_range(5..=10);
            RosterRecord {
                given_name: generate_word(rng, given_len),
                family_name: generate_word(rng, family_len),
                email: format!(
                    "{}@{}.com",
                    generate_word(rng, user_len),
                    generate_word(rng, domain_len)
                ),
                date_start: date_start.clone(),
            }
        })
        .collect()
}

/// Rewrite `path` with its existing rows followed by `count` new ones.
///
/// Returns the number of rows written in total.
pub fn seed_roster_file(path: &Path, count: usize, now: DateTime<Utc>) -> Result<usize, RosterError> {
    let mut records: Vec<RosterRecord> = if path.exists() {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;
        reader
            .deserialize::<RosterRecord>()
            .collect::<Result<_, _>>()?
    } else {
        Vec::new()
    };

    let mut rng = rand::rng();
    records.extend(generate_entries(&mut rng, count, now));

    let mut writer = csv::Writer::from_path(path)?;
    if records.is_empty() {
        writer.write_record(["FirstName", "LastName", "Email", "DateStart"])?;
    }
    for record in &records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(records.len())
}
