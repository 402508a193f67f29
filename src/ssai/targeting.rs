//! Targeting tags derived from the viewer context.

use chrono::{Datelike, Timelike, Weekday};
use spliceforge_common::{Targeting, ViewerContext};

/// Device class implied by a user agent string.
///
/// "Mobile" wins over "Tablet"; anything else is a desktop.
pub fn device_class(user_agent: &str) -> &'static str {
    if user_agent.contains("Mobile") {
        "mobile"
    } else if user_agent.contains("Tablet") {
        "tablet"
    } else {
        "desktop"
    }
}

/// Age bracket tag.
pub fn age_bracket(age: u32) -> &'static str {
    match age {
        0..=17 => "age-under-18",
        18..=24 => "age-18-24",
        25..=34 => "age-25-34",
        35..=49 => "age-35-49",
        _ => "age-50-plus",
    }
}

/// Bandwidth tier for a measured bandwidth in kbps.
pub fn bandwidth_tier(kbps: u32) -> &'static str {
    match kbps {
        0..=999 => "low-bandwidth",
        1000..=4999 => "medium-bandwidth",
        _ => "high-bandwidth",
    }
}

pub fn daypart(hour: u32) -> &'static str {
    match hour {
        6..=11 => "morning",
        12..=17 => "afternoon",
        18..=23 => "evening",
        _ => "night",
    }
}

/// Derive targeting for `viewer` at local time `at`.
pub fn derive_targeting<T: Datelike + Timelike>(viewer: &ViewerContext, at: &T) -> Targeting {
    let mut targeting = Targeting {
        content: vec!["live-streaming".into(), "entertainment".into()],
        ..Default::default()
    };

    if let Some(age) = viewer.age.filter(|&a| a > 0) {
        targeting.demographics.push(age_bracket(age).into());
    }
    if let Some(gender) = viewer.gender.as_deref().filter(|g| !g.is_empty()) {
        targeting.demographics.push(format!("gender-{}", gender));
    }

    if !viewer.user_agent.is_empty() {
        targeting.device.push(device_class(&viewer.user_agent).into());
    }
    if let Some(kbps) = viewer.bandwidth.filter(|&k| k > 0) {
        targeting.device.push(bandwidth_tier(kbps).into());
    }
    if let Some(location) = viewer.location.as_deref().filter(|l| !l.is_empty()) {
        targeting.location.push(format!("location-{}", location));
    }

    targeting.time.push(daypart(at.hour()).into());
    let week = match at.weekday() {
        Weekday::Sat | Weekday::Sun => "weekend",
        _ => "weekday",
    };
    targeting.time.push(week.into());

    targeting
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const IPHONE: &str =
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Mobile/15E148";
    const IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X) Mobile/15E148";

    #[test]
    fn device_classes() {
        assert_eq!(device_class(IPHONE), "mobile");
        // Any "Mobile" user agent is mobile, tablets included
        assert_eq!(device_class(IPAD), "mobile");
        assert_eq!(device_class("Mozilla/5.0 (Linux; Android 13; Tablet) Mobile"), "mobile");
        assert_eq!(device_class("Mozilla/5.0 (Linux; Android 13; Tablet)"), "tablet");
        assert_eq!(device_class("Roku/DVP-12.0"), "desktop");
        assert_eq!(device_class("Mozilla/5.0 (X11; Linux x86_64)"), "desktop");
    }

    #[test]
    fn age_brackets() {
        assert_eq!(age_bracket(17), "age-under-18");
        assert_eq!(age_bracket(18), "age-18-24");
        assert_eq!(age_bracket(34), "age-25-34");
        assert_eq!(age_bracket(35), "age-35-49");
        assert_eq!(age_bracket(50), "age-50-plus");
    }

    #[test]
    fn demographics_from_age_and_gender() {
        let at = NaiveDate::from_ymd_opt(2024, 6, 5)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let viewer = ViewerContext {
            age: Some(29),
            gender: Some("female".into()),
            ..Default::default()
        };
        let targeting = derive_targeting(&viewer, &at);
        assert_eq!(targeting.demographics, vec!["age-25-34", "gender-female"]);

        let unknown = ViewerContext {
            age: Some(0),
            gender: Some(String::new()),
            ..Default::default()
        };
        assert!(derive_targeting(&unknown, &at).demographics.is_empty());
    }

    #[test]
    fn bandwidth_tiers() {
        assert_eq!(bandwidth_tier(500), "low-bandwidth");
        assert_eq!(bandwidth_tier(1000), "medium-bandwidth");
        assert_eq!(bandwidth_tier(12_000), "high-bandwidth");
    }

    #[test]
    fn saturday_evening_mobile_viewer() {
        // 2024-06-01 was a Saturday.
        let at = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(20, 15, 0)
            .unwrap();
        let viewer = ViewerContext {
            user_agent: IPHONE.into(),
            bandwidth: Some(800),
            location: Some("us-east".into()),
            ..Default::default()
        };

        let targeting = derive_targeting(&viewer, &at);
        assert_eq!(targeting.device, vec!["mobile", "low-bandwidth"]);
        assert_eq!(targeting.location, vec!["location-us-east"]);
        assert_eq!(targeting.time, vec!["evening", "weekend"]);
        assert_eq!(targeting.content, vec!["live-streaming", "entertainment"]);
        assert!(targeting.demographics.is_empty());
    }

    #[test]
    fn empty_context_gets_time_and_content_only() {
        // 2024-06-05 was a Wednesday.
        let at = NaiveDate::from_ymd_opt(2024, 6, 5)
            .unwrap()
            .and_hms_opt(3, 0, 0)
            .unwrap();
        let targeting = derive_targeting(&ViewerContext::default(), &at);
        assert!(targeting.device.is_empty());
        assert!(targeting.location.is_empty());
        assert_eq!(targeting.time, vec!["night", "weekday"]);
    }
}
