//! Synthetic (Australian flavoured) demographics for test patients.

use chrono::{Datelike, Duration, Local, NaiveDate};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;

const LAST_NAMES: &[&str] = &[
    "Smith", "Jones", "Williams", "Brown", "Wilson", "Taylor", "Johnson", "White", "Martin",
    "Anderson", "Thompson", "Nguyen", "Thomas", "Walker", "Harris", "Lee", "Ryan", "Robinson",
    "Kelly", "King", "Davis", "Wright", "Evans", "Roberts", "Green", "Hall", "Wood", "Jackson",
    "Clarke", "Patel", "Khan", "Lewis", "James", "Phillips", "Mitchell", "Campbell", "Murphy",
];

const FIRST_NAMES: &[&str] = &[
    "Oliver", "Noah", "William", "Jack", "Leo", "Lucas", "Thomas", "Henry", "Charlie", "James",
    "Charlotte", "Amelia", "Isla", "Olivia", "Mia", "Ava", "Grace", "Chloe", "Willow", "Matilda",
    "Ruby", "Harper", "Zoe", "Sienna", "Lachlan", "Cooper", "Riley", "Hamish", "Archie", "Ella",
];

const STREET_NAMES: &[&str] = &[
    "George", "Elizabeth", "Collins", "Bourke", "Queen", "King", "Victoria", "Albert", "High",
    "Church", "Station", "Park", "Railway", "Beach", "Main", "Hill", "Bridge", "Smith", "Wattle",
    "Banksia",
];

const STREET_SUFFIXES: &[&str] = &["St", "Rd", "Ave", "Pde", "Cres", "Dr", "Ln", "Tce", "Way", "Cct"];

const CITIES: &[&str] = &[
    "Sydney", "Melbourne", "Brisbane", "Perth", "Adelaide", "Hobart", "Darwin", "Canberra",
    "Geelong", "Ballarat", "Bendigo", "Newcastle", "Wollongong", "Townsville", "Cairns",
    "Toowoomba", "Launceston", "Bairnsdale", "Ipswich", "Chatswood",
];

/// Australian states and territories.
pub const STATES: &[&str] = &["NSW", "VIC", "QLD", "SA", "WA", "TAS", "ACT", "NT"];

/// The kinds of synthetic value a template can ask for.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FakeKind {
    LastName,
    FirstName,
    StreetAddress,
    City,
    State,
    Postcode,
    /// Ten digits, the shape of an HL7 TN value after formatting.
    Phone,
    /// `YYYYMMDD` for someone aged between the two bounds.
    DateOfBirth {
        #[serde(default)]
        min_age: u32,
        #[serde(default = "default_max_age")]
        max_age: u32,
    },
    /// `M` or `F`.
    Sex,
}

fn default_max_age() -> u32 {
    90
}

fn pick<R: Rng + ?Sized>(rng: &mut R, pool: &[&'static str]) -> &'static str {
    pool.choose(rng).copied().unwrap_or_default()
}

impl FakeKind {
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        match self {
            FakeKind::LastName => pick(rng, LAST_NAMES).to_string(),
            FakeKind::FirstName => pick(rng, FIRST_NAMES).to_string(),
            FakeKind::StreetAddress => format!(
                "{} {} {}",
                rng.gen_range(1..=399),
                pick(rng, STREET_NAMES),
                pick(rng, STREET_SUFFIXES)
            ),
            FakeKind::City => pick(rng, CITIES).to_string(),
            FakeKind::State => pick(rng, STATES).to_string(),
            FakeKind::Postcode => format!("{:04}", rng.gen_range(800..=7999)),
            FakeKind::Phone => format!("04{:08}", rng.gen_range(0..100_000_000u32)),
            FakeKind::DateOfBirth { min_age, max_age } => {
                date_of_birth(rng, *min_age, *max_age).format("%Y%m%d").to_string()
            }
            FakeKind::Sex => pick(rng, &["M", "F"]).to_string(),
        }
    }
}

fn date_of_birth<R: Rng + ?Sized>(rng: &mut R, min_age: u32, max_age: u32) -> NaiveDate {
    let today = Local::now().date_naive();
    let (young, old) = if min_age <= max_age {
        (min_age, max_age)
    } else {
        (max_age, min_age)
    };
    // born after the day the person would turn old + 1, no later than turning young
    let latest = years_before(today, young);
    let earliest = years_before(today, old + 1) + Duration::days(1);
    let span = (latest - earliest).num_days().max(0);
    earliest + Duration::days(rng.gen_range(0..=span))
}

fn years_before(date: NaiveDate, years: u32) -> NaiveDate {
    let year = date.year() - years as i32;
    // 29 February falls back to the 28th in non leap years
    date.with_year(year)
        .or_else(|| NaiveDate::from_ymd_opt(year, date.month(), 28))
        .unwrap_or(date)
}
