// tests/redaction.rs
//
// PII scrubbing applied to case text before it is embedded in a prompt.
//
// Covered:
// - each pattern class (email, phone, ID-like token, date, labeled name)
// - rule order (phone wins over ISO-looking digit runs)
// - idempotence on already-redacted text
// - clinical prose that must survive untouched

use case_note_critic::analyze::redact::{
    redact, DATE_PLACEHOLDER, EMAIL_PLACEHOLDER, ID_PLACEHOLDER, NAME_PLACEHOLDER,
    PHONE_PLACEHOLDER,
};

#[test]
fn email_is_replaced() {
    let out = redact("Contact: john.doe@hospital.org for records");
    assert_eq!(out, format!("Contact: {EMAIL_PLACEHOLDER} for records"));
}

#[test]
fn phone_numbers_in_common_shapes_are_replaced() {
    for phone in ["555-123-4567", "555.123.4567", "+1 555 123 4567"] {
        let out = redact(&format!("call {phone} today"));
        assert_eq!(out, format!("call {PHONE_PLACEHOLDER} today"), "input {phone}");
    }
}

#[test]
fn record_numbers_are_replaced_but_words_are_not() {
    let out = redact("MRN AB12345 reviewed; hypertension stable");
    assert_eq!(out, format!("MRN {ID_PLACEHOLDER} reviewed; hypertension stable"));
}

#[test]
fn slash_dates_are_replaced() {
    let out = redact("Seen on 3/14/2024 and again 12/01/24.");
    assert_eq!(
        out,
        format!("Seen on {DATE_PLACEHOLDER} and again {DATE_PLACEHOLDER}.")
    );
}

#[test]
fn iso_dates_fall_to_the_earlier_phone_rule() {
    // Phone runs before date, and a ten-character digit/dash run looks like a phone.
    let out = redact("DOB 1980-04-02");
    assert_eq!(out, format!("DOB {PHONE_PLACEHOLDER}"));
}

#[test]
fn labeled_names_keep_the_label_and_lose_the_line() {
    let out = redact("Name: Jane Roe\nPatient: John Smith, 45\nChief complaint: cough");
    assert_eq!(
        out,
        format!(
            "Name: {NAME_PLACEHOLDER}\nPatient: {NAME_PLACEHOLDER}\nChief complaint: cough"
        )
    );
}

#[test]
fn label_match_is_case_insensitive_and_keeps_original_casing() {
    let out = redact("patient : Mary Major");
    assert_eq!(out, format!("patient: {NAME_PLACEHOLDER}"));
}

#[test]
fn empty_label_does_not_swallow_the_next_line() {
    let input = "Name:\nHPI: chest pain for 2 days";
    assert_eq!(redact(input), input);

    let out = redact("Patient:   \nHPI: chest pain");
    assert!(out.ends_with("\nHPI: chest pain"), "{out}");
}

#[test]
fn redaction_is_idempotent() {
    let input = "Name: Jane Roe\nEmail jane@ex.org, phone 555-123-4567, MRN 99AB1234, seen 1/2/2023";
    let once = redact(input);
    assert_eq!(redact(&once), once);
    assert!(!once.contains("jane@ex.org"));
    assert!(!once.contains("555-123-4567"));
    assert!(!once.contains("99AB1234"));
    assert!(!once.contains("1/2/2023"));
}

#[test]
fn clean_clinical_text_is_unchanged() {
    let s = "45-year-old male with substernal chest pressure radiating to the left arm. \
             BP 150/95, HR 98. Plan: ECG, troponins, aspirin.";
    assert_eq!(redact(s), s);
}

#[test]
fn empty_input_is_fine() {
    assert_eq!(redact(""), "");
}
