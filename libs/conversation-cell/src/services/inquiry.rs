// libs/conversation-cell/src/services/inquiry.rs
//! Static practice information answered without the language model.

use crate::models::InquiryTopic;

const SELF_PAY_KEYWORDS: &[&str] = &["no insurance", "without insurance", "self pay", "self-pay", "membership"];
const INSURANCE_KEYWORDS: &[&str] = &["insurance", "coverage", "covered", "plan", "provider"];
const PAYMENT_KEYWORDS: &[&str] = &["payment", "pay", "cost", "price", "fee", "cash", "credit", "finance"];
const HOURS_KEYWORDS: &[&str] = &["hours", "open", "close", "time", "schedule", "when"];
const LOCATION_KEYWORDS: &[&str] = &["where", "location", "address", "directions", "parking"];

const ACCEPTED_INSURANCE: &[&str] = &[
    "All major dental insurance plans accepted",
    "Delta Dental",
    "Cigna",
    "Aetna",
    "MetLife",
    "United Healthcare",
    "Guardian",
    "BlueCross BlueShield",
];

const SELF_PAY_OPTIONS: &[&str] = &[
    "Flexible payment plans available",
    "Membership plans for regular preventive care",
    "Cash, credit cards, and HSA/FSA accepted",
    "CareCredit financing available",
];

const MEMBERSHIP_BENEFITS: &[&str] = &[
    "Two cleanings per year included",
    "X-rays included",
    "Discounts on additional treatments",
    "No waiting periods",
    "No annual maximums",
];

struct Location {
    address: &'static str,
    city: &'static str,
    state: &'static str,
    zip: &'static str,
    parking: &'static str,
    accessibility: &'static str,
}

const LOCATION: Location = Location {
    address: "123 Dental Way, Suite 100",
    city: "Dentalville",
    state: "ST",
    zip: "12345",
    parking: "Free parking available",
    accessibility: "Wheelchair accessible",
};

fn mentions_any(message: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| message.contains(keyword))
}

/// Self-pay is checked before insurance so "no insurance" is not read as an insurance question.
pub fn topic(message: &str) -> Option<InquiryTopic> {
    let message = message.to_lowercase();

    [
        (InquiryTopic::SelfPay, SELF_PAY_KEYWORDS),
        (InquiryTopic::Insurance, INSURANCE_KEYWORDS),
        (InquiryTopic::Payment, PAYMENT_KEYWORDS),
        (InquiryTopic::Hours, HOURS_KEYWORDS),
        (InquiryTopic::Location, LOCATION_KEYWORDS),
    ]
    .into_iter()
    .find(|(_, keywords)| mentions_any(&message, keywords))
    .map(|(topic, _)| topic)
}

pub fn answer(topic: InquiryTopic) -> String {
    match topic {
        InquiryTopic::Insurance => format!(
            "We accept all major dental insurance plans, including:\n{}\n\n\
             For specific coverage details, please have your insurance card ready when you visit.",
            ACCEPTED_INSURANCE.join("\n")
        ),
        InquiryTopic::SelfPay => format!(
            "For patients without insurance, we offer several options:\n{}\n\nOur membership plan includes:\n{}",
            SELF_PAY_OPTIONS.join("\n"),
            MEMBERSHIP_BENEFITS.join("\n")
        ),
        InquiryTopic::Payment => "We offer flexible payment options:\n\
             • All major credit cards accepted\n\
             • CareCredit financing available\n\
             • Payment plans for major procedures\n\
             • HSA/FSA accounts accepted\n\n\
             For patients without insurance, we also offer an affordable membership plan."
            .to_string(),
        InquiryTopic::Hours => "Our office hours are:\n\
             Monday-Saturday: 8:00 AM - 6:00 PM\n\
             Sunday: Closed\n\n\
             We also accommodate emergency appointments during business hours."
            .to_string(),
        InquiryTopic::Location => format!(
            "We are located at:\n{}\n{}, {} {}\n\n{}\n{}",
            LOCATION.address,
            LOCATION.city,
            LOCATION.state,
            LOCATION.zip,
            LOCATION.parking,
            LOCATION.accessibility
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_insurance_is_self_pay() {
        assert_eq!(topic("What if I have no insurance?"), Some(InquiryTopic::SelfPay));
        assert_eq!(topic("Do you take Cigna insurance?"), Some(InquiryTopic::Insurance));
    }

    #[test]
    fn test_topics_in_order() {
        assert_eq!(topic("How much does a cleaning cost?"), Some(InquiryTopic::Payment));
        assert_eq!(topic("When are you open?"), Some(InquiryTopic::Hours));
        assert_eq!(topic("Is there PARKING nearby?"), Some(InquiryTopic::Location));
        assert_eq!(topic("Do you do whitening?"), None);
    }

    #[test]
    fn test_location_answer() {
        let text = answer(InquiryTopic::Location);
        assert!(text.contains("123 Dental Way, Suite 100\nDentalville, ST 12345"));
        assert!(text.ends_with("Wheelchair accessible"));
    }
}
