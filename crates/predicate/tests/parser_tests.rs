//! Tests for parsing filter text and evaluating it against records.

use std::sync::Arc;

use odata_predicate::{
    DynamicRecord, FilterParser, FlagsMatch, ParserOptions, Predicate, SchemaDocument, TypeSchema,
    ValueType, to_odata,
};
use serde_json::{Value as JsonValue, json};

const SCHEMA: &str = r#"
name: StubMessage
fields:
  MessageId: int32
  BooleanValue: bool
  Name: string
  Count: int32?
  Score: double
  Price: decimal
  Kind: Flags
  Id: guid
  Created: datetime
  ComplexProperty: Complex
enums:
  Flags:
    flags: true
    members: { A: 1, B: 2, C: 4 }
records:
  Complex:
    fields:
      Foo: string
      BooleanValue: bool
"#;

fn schema() -> Arc<TypeSchema> {
    SchemaDocument::from_yaml_str(SCHEMA)
        .and_then(|doc| doc.build())
        .expect("schema builds")
}

fn parser() -> FilterParser {
    FilterParser::new(schema())
}

fn message(overrides: JsonValue) -> DynamicRecord {
    let mut base = json!({
        "MessageId": 2,
        "BooleanValue": true,
        "Name": "FOO",
        "Count": null,
        "Score": 2.5,
        "Price": "19.99",
        "Kind": 3,
        "Id": "6f9619ff-8b86-d011-b42d-00cf4fc964ff",
        "Created": "2012-05-06T07:08:09",
        "ComplexProperty": { "Foo": "foo", "BooleanValue": false }
    });
    if let (Some(base), Some(overrides)) = (base.as_object_mut(), overrides.as_object()) {
        for (key, value) in overrides {
            base.insert(key.clone(), value.clone());
        }
    }
    DynamicRecord::from_json(schema(), &base).expect("record converts")
}

fn parse_ok(filter: &str) -> Predicate {
    parser()
        .parse(filter)
        .expect("filter should parse")
        .expect("filter should not be empty")
}

fn parse_err(filter: &str) {
    assert!(
        parser().parse(filter).is_err(),
        "filter unexpectedly parsed: {filter}"
    );
}

fn matches(filter: &str, record: &DynamicRecord) -> bool {
    parser()
        .compile(filter)
        .expect("filter should compile")
        .matches(record)
}

// =============================================================================
// Comparisons
// =============================================================================

#[test]
fn numeric_comparisons() {
    let record = message(json!({}));
    assert!(matches("MessageId eq 2", &record));
    assert!(matches("MessageId ne 3", &record));
    assert!(matches("MessageId gt 1", &record));
    assert!(matches("MessageId ge 2", &record));
    assert!(matches("MessageId lt 3", &record));
    assert!(matches("MessageId le 2", &record));
    assert!(!matches("MessageId gt 2", &record));
    assert!(matches("Score gt 2", &record));
    assert!(matches("2 lt Score", &record));
}

#[test]
fn arithmetic_inside_comparisons() {
    let record = message(json!({ "MessageId": 16 }));
    assert!(matches("(MessageId mod 2) eq 0", &record));
    assert!(matches("(MessageId add 5) gt 20", &record));
    assert!(matches("(MessageId div 4) eq 4", &record));
    assert!(!matches("(MessageId sub 10) gt 10", &record));
}

#[test]
fn literal_types_follow_the_property() {
    let Predicate::Binary { right, .. } = parse_ok("Score eq 1") else {
        panic!("expected a comparison");
    };
    assert_eq!(right.result_type(), ValueType::Double);
}

#[test]
fn decimal_rounding_stays_decimal() {
    let record = message(json!({ "Price": 19.5 }));
    assert!(matches("Price gt 19.49", &record));
    assert!(matches("Price eq 19.50M", &record));
    assert!(matches("(Price mul 2) eq 39", &record));
    assert!(matches("round(Price) eq 20", &record));
    assert!(matches("floor(Price) eq 19", &record));
    assert!(matches("ceiling(Price) eq 20", &record));
    assert!(matches("round(Score) eq 2", &record));

    let Predicate::Binary { left, .. } = parse_ok("round(Price) eq 20") else {
        panic!("expected a comparison");
    };
    assert_eq!(left.result_type(), ValueType::Decimal);
    let Predicate::Binary { left, .. } = parse_ok("round(Score) eq 2") else {
        panic!("expected a comparison");
    };
    assert_eq!(left.result_type(), ValueType::Double);
}

#[test]
fn boolean_properties_stand_alone() {
    let record = message(json!({}));
    assert!(matches("BooleanValue", &record));
    assert!(!matches("not BooleanValue", &record));
    assert!(matches("BooleanValue eq true", &record));
    assert!(!matches("ComplexProperty/BooleanValue", &record));
}

// =============================================================================
// Combinators
// =============================================================================

#[test]
fn grouped_combinators() {
    let record = message(json!({}));
    assert!(matches("(MessageId gt 1) and (MessageId lt 5)", &record));
    assert!(!matches("(MessageId gt 2) and (MessageId lt 5)", &record));
    assert!(matches("(MessageId gt 2) or (BooleanValue eq true)", &record));
    assert!(!matches("not ((MessageId lt 1) or (MessageId gt 1))", &record));
}

#[test]
fn literals_on_the_left_of_a_grouped_comparison() {
    let record = message(json!({ "MessageId": 3 }));
    assert!(matches("(MessageId gt 1) and (5 gt MessageId)", &record));
    assert!(!matches("(MessageId gt 1) and (2 gt MessageId)", &record));
    assert!(matches("not ((2.5 gt Score) or (1 eq MessageId))", &record));
}

#[test]
fn combinators_fold_left_to_right() {
    // Read as `(MessageId eq 1 or MessageId eq 2) and BooleanValue eq true`.
    let record = message(json!({ "MessageId": 1, "BooleanValue": false }));
    assert!(!matches(
        "MessageId eq 1 or MessageId eq 2 and BooleanValue eq true",
        &record
    ));
    // Read as `(MessageId eq 1 and BooleanValue eq true) or MessageId eq 1`.
    assert!(matches(
        "MessageId eq 1 and BooleanValue eq true or MessageId eq 1",
        &record
    ));
}

#[test]
fn not_inside_a_chain_keeps_the_left_side() {
    let record = message(json!({ "MessageId": 7, "BooleanValue": false }));
    assert!(!matches("MessageId eq 1 and not BooleanValue", &record));
    assert!(matches("MessageId eq 7 and not BooleanValue", &record));
}

// =============================================================================
// Strings and functions
// =============================================================================

#[test]
fn string_functions() {
    let record = message(json!({}));
    assert!(matches("Name eq 'FOO'", &record));
    assert!(matches("substringof('f', ComplexProperty/Foo) eq true", &record));
    assert!(matches("substringof('o', ComplexProperty/Foo)", &record));
    assert!(!matches("substringof('x', ComplexProperty/Foo) eq true", &record));
    assert!(matches("startswith(Name, 'FO')", &record));
    assert!(matches("endswith(Name, 'OO') eq true", &record));
    assert!(matches("tolower(Name) eq 'foo'", &record));
    assert!(matches("length(Name) eq 3", &record));
    assert!(matches("indexof(Name, 'O') eq 1", &record));
}

#[test]
fn unquoted_words_against_strings_are_text() {
    let record = message(json!({ "Name": "bar" }));
    assert!(matches("Name eq bar", &record));
}

#[test]
fn keywords_inside_quotes_stay_in_the_literal() {
    let record = message(json!({ "Name": "salt and pepper" }));
    assert!(matches("Name eq 'salt and pepper'", &record));
    assert!(matches("(Name eq 'salt and pepper') and BooleanValue", &record));
    assert!(matches("startswith(Name, 'salt and')", &record));
    assert!(!matches("substringof('or not', Name)", &record));
}

#[test]
fn unknown_functions_are_errors() {
    let err = parser()
        .parse("frobnicate(Name) eq 'x'")
        .expect_err("unknown function");
    assert!(err.reason.contains("unknown function"), "{err}");
}

// =============================================================================
// Typed literals, enums and nulls
// =============================================================================

#[test]
fn guid_and_datetime_literals() {
    let record = message(json!({}));
    assert!(matches(
        "Id eq guid'6f9619ff-8b86-d011-b42d-00cf4fc964ff'",
        &record
    ));
    assert!(matches("Created gt datetime'2012-01-01T00:00:00'", &record));
    assert!(matches("Created lt '2013-01-01'", &record));
}

#[test]
fn registered_constructors() {
    let record = message(json!({}));
    assert!(matches("Created gt new DateTime(2012, 1, 1)", &record));
    assert!(!matches("Created gt new DateTime(2012, 6, 1)", &record));
}

#[test]
fn flags_equality_is_exact_by_default() {
    let record = message(json!({ "Kind": 3 }));
    assert!(!matches("Kind eq 'A'", &record));
    assert!(matches("Kind eq 'A, B'", &record));

    let contains = parser()
        .with_options(ParserOptions::default().with_flags_match(FlagsMatch::Contains))
        .compile("Kind eq 'A'")
        .expect("filter compiles");
    assert!(contains.matches(&record));
}

#[test]
fn flags_inequality_is_plain_in_contains_mode() {
    let record = message(json!({ "Kind": 3 }));
    let contains = parser().with_options(ParserOptions::default().with_flags_match(FlagsMatch::Contains));
    let compile = |filter: &str| contains.compile(filter).expect("filter compiles");

    assert!(compile("Kind ne 'A'").matches(&record));
    assert!(!compile("Kind ne 'A, B'").matches(&record));
    assert!(compile("Kind eq 'A'").matches(&record));
}

#[test]
fn nulls_are_lifted() {
    let empty = message(json!({ "Count": null }));
    assert!(matches("Count eq null", &empty));
    assert!(!matches("Count gt 1", &empty));
    assert!(matches("Count ne 1", &empty));

    let counted = message(json!({ "Count": 4 }));
    assert!(!matches("Count eq null", &counted));
    assert!(matches("Count gt 1", &counted));
}

#[test]
fn null_against_a_non_nullable_property_is_rejected() {
    parse_err("MessageId eq null");
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn empty_filter_matches_everything() {
    assert!(parser().parse("   ").expect("blank parses").is_none());
    assert!(matches("", &message(json!({}))));
}

#[test]
fn malformed_filters_are_rejected() {
    parse_err("Nope eq 1");
    parse_err("MessageId eq 'abc'");
    parse_err("MessageId add 1");
    parse_err("MessageId add 5 gt 10");
    parse_err("Name eq");
}

#[test]
fn evaluation_faults_reject_the_record() {
    let record = message(json!({}));
    let compiled = parser()
        .compile("(MessageId div 0) eq 1")
        .expect("filter compiles");
    assert!(!compiled.matches(&record));
    assert!(compiled.try_matches(&record).is_err());
}

// =============================================================================
// Round trips
// =============================================================================

#[test]
fn serialized_filters_parse_to_the_same_text() {
    let records = [
        message(json!({})),
        message(json!({ "MessageId": 0, "Kind": 1, "Created": "2011-06-01T00:00:00" })),
        message(json!({
            "MessageId": 7,
            "ComplexProperty": { "Foo": "bar", "BooleanValue": true }
        })),
    ];
    for filter in [
        "(MessageId gt 1) and (MessageId lt 5)",
        "not ((MessageId lt 1) or (MessageId gt 5))",
        "substringof('f', ComplexProperty/Foo) eq true",
        "(MessageId mod 2) eq 0",
        "Created gt datetime'2012-01-01T00:00:00'",
        "Kind eq 'A, B'",
        "Price ge 10.50M",
        "Id eq guid'6f9619ff-8b86-d011-b42d-00cf4fc964ff'",
    ] {
        let first = to_odata(&parse_ok(filter)).expect("serializes");
        let second = to_odata(&parse_ok(&first)).expect("serializes again");
        assert_eq!(first, second, "round trip of {filter}");

        let original = parser().compile(filter).expect("filter compiles");
        let reparsed = parser().compile(&first).expect("serialized filter compiles");
        for record in &records {
            assert_eq!(
                original.matches(record),
                reparsed.matches(record),
                "{filter} and {first} disagree"
            );
        }
    }
}
