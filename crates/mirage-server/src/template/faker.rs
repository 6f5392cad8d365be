//! Fake data generation for the `faker` helper.
//!
//! Method names follow the `namespace.method` convention (`person.firstName`,
//! `internet.email`, ...). Each name maps to one [`FakerMethod`] variant, and
//! values are produced by the `fake` crate using the server's seeded rng.

use chrono::{Duration, Utc};
use fake::faker::address::raw::{
    BuildingNumber, CityName, CountryCode, CountryName, StateName, StreetName, ZipCode,
};
use fake::faker::company::raw::{Buzzword, CompanyName};
use fake::faker::internet::raw::{
    DomainSuffix, FreeEmail, IPv4, IPv6, Password, UserAgent, Username,
};
use fake::faker::job::raw::Title as JobTitle;
use fake::faker::lorem::raw::{Paragraph, Sentence, Word, Words};
use fake::faker::name::raw::{FirstName, LastName, Name, Title};
use fake::faker::phone_number::raw::PhoneNumber;
use fake::locales::{Data, EN, FR_FR, ZH_CN, ZH_TW};
use fake::Fake;
use rand::rngs::StdRng;
use rand::Rng;
use serde_json::Value;

use crate::environment::FakerLocale;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakerMethod {
    PersonFirstName,
    PersonLastName,
    PersonFullName,
    PersonPrefix,
    PersonJobTitle,
    InternetEmail,
    InternetUserName,
    InternetDomainName,
    InternetDomainSuffix,
    InternetIp,
    InternetIpv6,
    InternetUserAgent,
    InternetPassword,
    LocationCity,
    LocationCountry,
    LocationCountryCode,
    LocationState,
    LocationStreet,
    LocationStreetAddress,
    LocationZipCode,
    LocationLatitude,
    LocationLongitude,
    CompanyName,
    CompanyBuzzword,
    PhoneNumber,
    ColorRgb,
    LoremWord,
    LoremWords,
    LoremSentence,
    LoremParagraph,
    NumberInt,
    NumberFloat,
    DatatypeBoolean,
    StringUuid,
    DatePast,
    DateFuture,
    Unknown,
}

impl FakerMethod {
    pub fn from_name(name: &str) -> Self {
        match name {
            "person.firstName" => FakerMethod::PersonFirstName,
            "person.lastName" => FakerMethod::PersonLastName,
            "person.fullName" => FakerMethod::PersonFullName,
            "person.prefix" => FakerMethod::PersonPrefix,
            "person.jobTitle" => FakerMethod::PersonJobTitle,
            "internet.email" => FakerMethod::InternetEmail,
            "internet.userName" | "internet.username" => FakerMethod::InternetUserName,
            "internet.domainName" => FakerMethod::InternetDomainName,
            "internet.domainSuffix" => FakerMethod::InternetDomainSuffix,
            "internet.ip" | "internet.ipv4" => FakerMethod::InternetIp,
            "internet.ipv6" => FakerMethod::InternetIpv6,
            "internet.userAgent" => FakerMethod::InternetUserAgent,
            "internet.password" => FakerMethod::InternetPassword,
            "location.city" => FakerMethod::LocationCity,
            "location.country" => FakerMethod::LocationCountry,
            "location.countryCode" => FakerMethod::LocationCountryCode,
            "location.state" => FakerMethod::LocationState,
            "location.street" => FakerMethod::LocationStreet,
            "location.streetAddress" => FakerMethod::LocationStreetAddress,
            "location.zipCode" => FakerMethod::LocationZipCode,
            "location.latitude" => FakerMethod::LocationLatitude,
            "location.longitude" => FakerMethod::LocationLongitude,
            "company.name" => FakerMethod::CompanyName,
            "company.buzzNoun" | "company.buzzword" => FakerMethod::CompanyBuzzword,
            "phone.number" => FakerMethod::PhoneNumber,
            "color.rgb" => FakerMethod::ColorRgb,
            "lorem.word" => FakerMethod::LoremWord,
            "lorem.words" => FakerMethod::LoremWords,
            "lorem.sentence" => FakerMethod::LoremSentence,
            "lorem.paragraph" => FakerMethod::LoremParagraph,
            "number.int" => FakerMethod::NumberInt,
            "number.float" => FakerMethod::NumberFloat,
            "datatype.boolean" => FakerMethod::DatatypeBoolean,
            "string.uuid" => FakerMethod::StringUuid,
            "date.past" => FakerMethod::DatePast,
            "date.future" => FakerMethod::DateFuture,
            _ => FakerMethod::Unknown,
        }
    }
}

/// Numeric bounds accepted by `number.*` and `lorem.*` methods, either as
/// positional arguments or as `min=`/`max=` hash arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakerArgs {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Generate a value for `method` in the given locale.
pub fn generate(
    method: FakerMethod,
    args: FakerArgs,
    locale: FakerLocale,
    rng: &mut StdRng,
) -> Value {
    match locale {
        FakerLocale::En => generate_in(method, args, EN, rng),
        FakerLocale::Fr => generate_in(method, args, FR_FR, rng),
        FakerLocale::ZhCn => generate_in(method, args, ZH_CN, rng),
        FakerLocale::ZhTw => generate_in(method, args, ZH_TW, rng),
    }
}

fn count_range(args: FakerArgs, default_min: usize, default_max: usize) -> std::ops::Range<usize> {
    let min = args.min.map(|m| m.max(0.0) as usize).unwrap_or(default_min);
    let max = args.max.map(|m| m.max(0.0) as usize).unwrap_or(default_max.max(min));
    min..max.max(min) + 1
}

fn generate_in<L: Data + Copy>(
    method: FakerMethod,
    args: FakerArgs,
    l: L,
    rng: &mut StdRng,
) -> Value {
    let text = match method {
        FakerMethod::PersonFirstName => FirstName(l).fake_with_rng::<String, _>(rng),
        FakerMethod::PersonLastName => LastName(l).fake_with_rng::<String, _>(rng),
        FakerMethod::PersonFullName => Name(l).fake_with_rng::<String, _>(rng),
        FakerMethod::PersonPrefix => Title(l).fake_with_rng::<String, _>(rng),
        FakerMethod::PersonJobTitle => JobTitle(l).fake_with_rng::<String, _>(rng),
        FakerMethod::InternetEmail => FreeEmail(l).fake_with_rng::<String, _>(rng),
        FakerMethod::InternetUserName => Username(l).fake_with_rng::<String, _>(rng),
        FakerMethod::InternetDomainName => {
            let word: String = Word(EN).fake_with_rng(rng);
            let suffix: String = DomainSuffix(l).fake_with_rng(rng);
            format!("{word}.{suffix}")
        }
        FakerMethod::InternetDomainSuffix => DomainSuffix(l).fake_with_rng::<String, _>(rng),
        FakerMethod::InternetIp => IPv4(l).fake_with_rng::<String, _>(rng),
        FakerMethod::InternetIpv6 => IPv6(l).fake_with_rng::<String, _>(rng),
        FakerMethod::InternetUserAgent => UserAgent(l).fake_with_rng::<String, _>(rng),
        FakerMethod::InternetPassword => {
            Password(l, count_range(args, 8, 16)).fake_with_rng::<String, _>(rng)
        }
        FakerMethod::LocationCity => CityName(l).fake_with_rng::<String, _>(rng),
        FakerMethod::LocationCountry => CountryName(l).fake_with_rng::<String, _>(rng),
        FakerMethod::LocationCountryCode => CountryCode(l).fake_with_rng::<String, _>(rng),
        FakerMethod::LocationState => StateName(l).fake_with_rng::<String, _>(rng),
        FakerMethod::LocationStreet => StreetName(l).fake_with_rng::<String, _>(rng),
        FakerMethod::LocationStreetAddress => {
            let number: String = BuildingNumber(l).fake_with_rng(rng);
            let street: String = StreetName(l).fake_with_rng(rng);
            format!("{number} {street}")
        }
        FakerMethod::LocationZipCode => ZipCode(l).fake_with_rng::<String, _>(rng),
        FakerMethod::LocationLatitude => format!("{:.4}", rng.gen_range(-90.0..=90.0f64)),
        FakerMethod::LocationLongitude => format!("{:.4}", rng.gen_range(-180.0..=180.0f64)),
        FakerMethod::CompanyName => CompanyName(l).fake_with_rng::<String, _>(rng),
        FakerMethod::CompanyBuzzword => Buzzword(l).fake_with_rng::<String, _>(rng),
        FakerMethod::PhoneNumber => PhoneNumber(l).fake_with_rng::<String, _>(rng),
        FakerMethod::ColorRgb => format!("#{:06x}", rng.gen_range(0..0x0100_0000u32)),
        FakerMethod::LoremWord => Word(l).fake_with_rng::<String, _>(rng),
        FakerMethod::LoremWords => {
            let words: Vec<String> = Words(l, count_range(args, 3, 3)).fake_with_rng(rng);
            words.join(" ")
        }
        FakerMethod::LoremSentence => {
            Sentence(l, count_range(args, 4, 10)).fake_with_rng::<String, _>(rng)
        }
        FakerMethod::LoremParagraph => {
            Paragraph(l, count_range(args, 3, 6)).fake_with_rng::<String, _>(rng)
        }
        FakerMethod::NumberInt => {
            let min = args.min.unwrap_or(0.0) as i64;
            let max = (args.max.unwrap_or(99_999.0) as i64).max(min);
            return Value::from(rng.gen_range(min..=max));
        }
        FakerMethod::NumberFloat => {
            let min = args.min.unwrap_or(0.0);
            let max = args.max.unwrap_or(100.0).max(min);
            let value = if max > min { rng.gen_range(min..max) } else { min };
            return Value::from((value * 100.0).round() / 100.0);
        }
        FakerMethod::DatatypeBoolean => return Value::Bool(rng.gen_bool(0.5)),
        FakerMethod::StringUuid => uuid::Builder::from_random_bytes(rng.gen())
            .into_uuid()
            .to_string(),
        FakerMethod::DatePast => {
            let offset = Duration::seconds(rng.gen_range(1..=365 * 24 * 3600));
            (Utc::now() - offset).to_rfc3339()
        }
        FakerMethod::DateFuture => {
            let offset = Duration::seconds(rng.gen_range(1..=365 * 24 * 3600));
            (Utc::now() + offset).to_rfc3339()
        }
        FakerMethod::Unknown => return Value::Null,
    };
    Value::String(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_method_lookup() {
        assert_eq!(
            FakerMethod::from_name("person.firstName"),
            FakerMethod::PersonFirstName
        );
        assert_eq!(FakerMethod::from_name("name.firstName"), FakerMethod::Unknown);
    }

    #[test]
    fn test_seeded_generation_is_deterministic() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        for method in [
            FakerMethod::PersonFirstName,
            FakerMethod::InternetEmail,
            FakerMethod::StringUuid,
            FakerMethod::LoremSentence,
        ] {
            assert_eq!(
                generate(method, FakerArgs::default(), FakerLocale::En, &mut a),
                generate(method, FakerArgs::default(), FakerLocale::En, &mut b)
            );
        }
    }

    #[test]
    fn test_number_int_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let args = FakerArgs {
            min: Some(5.0),
            max: Some(7.0),
        };
        for _ in 0..50 {
            let v = generate(FakerMethod::NumberInt, args, FakerLocale::En, &mut rng);
            let n = v.as_i64().unwrap();
            assert!((5..=7).contains(&n));
        }
    }

    #[test]
    fn test_uuid_shape() {
        let mut rng = StdRng::seed_from_u64(3);
        let v = generate(FakerMethod::StringUuid, FakerArgs::default(), FakerLocale::Fr, &mut rng);
        assert!(uuid::Uuid::parse_str(v.as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_unknown_is_null() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(
            generate(FakerMethod::Unknown, FakerArgs::default(), FakerLocale::En, &mut rng),
            Value::Null
        );
    }

    #[test]
    fn test_color_is_hex() {
        let mut rng = StdRng::seed_from_u64(9);
        let v = generate(FakerMethod::ColorRgb, FakerArgs::default(), FakerLocale::En, &mut rng);
        let s = v.as_str().unwrap();
        assert_eq!(s.len(), 7);
        assert!(s.starts_with('#'));
    }
}
