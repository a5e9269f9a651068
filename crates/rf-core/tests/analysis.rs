use rf_core::report::{generate_report, ReportFormat};
use rf_core::{
    AnalysisConfig, AnalysisContext, AnalysisInput, Analyzer, ComboRole, DiscrepancyCategory,
    FinalStatus, Severity, StaticRuleBase,
};
use rf_parsers::Band;

const MANIFEST: &str = r##"{
    "band_sources": [
        {"stage": "Rfc", "name": "rfc_bands",
         "encoding": {"kind": "index_list", "rat": "Lte", "index_base": "OneBased"},
         "text": "2 7 66"},
        {"stage": "Carrier", "name": "carrier_exclusions",
         "encoding": {"kind": "index_list", "rat": "Lte", "index_base": "OneBased"},
         "text": "7"},
        {"stage": "RuntimeLog", "name": "0x1CCA",
         "encoding": {"kind": "labeled_hex", "label": "LTE Bands",
                      "layout": {"rat": "Lte", "word_bit_width": 32, "range_start": 1,
                                 "index_base": "ZeroBased"}},
         "text": "Band capability\nLTE Bands: 0x00000002 0x00000000 0x00000002"},
        {"stage": "Advertised", "name": "uecap_bands",
         "encoding": {"kind": "index_list", "rat": "Lte", "index_base": "OneBased"},
         "text": "2, 66"}
    ],
    "combo_sources": [
        {"role": "declared", "name": "rfc_combos",
         "text": "B2A+B66A\nB7A+B66A\n1A-3A\nB66A+N77A[100x4]\nB2A+N261A"},
        {"role": "filtered", "name": "rrc_combos",
         "text": "# after software filtering\nB66A+B2A\nN77A[100x2]+B66A\nB2A+N261A\nB2A+X5A\n14A-66A"},
        {"role": "advertised", "name": "uecap_combos", "text": "B66A+B2A\nB66A+N77A"}
    ],
    "prune_lists": [
        {"name": "prune_list", "text": "1A-3A-0;"}
    ]
}"##;

const RULES: &str = r#"{
    "carriers": [
        {"name": "CarrierX", "weight": "strict",
         "excluded_bands": [{"rat": "Lte", "number": 7}]}
    ]
}"#;

fn run() -> rf_core::AnalysisReport {
    let input = AnalysisInput::from_json(MANIFEST).unwrap();
    let rules = StaticRuleBase::from_json(RULES).unwrap();
    let config = AnalysisConfig {
        context: AnalysisContext::new().with_carrier("carrierx"),
        ..Default::default()
    };
    Analyzer::new(config, Box::new(rules)).run(&input).unwrap()
}

fn find<'a>(
    report: &'a rf_core::AnalysisReport,
    key: &str,
    reference: &str,
) -> &'a rf_core::Discrepancy {
    report
        .discrepancies
        .iter()
        .find(|d| d.subject.to_string() == key && d.reference == reference)
        .unwrap()
}

#[test]
fn test_band_traces() {
    let report = run();

    let status = |band: Band| {
        report
            .traces
            .iter()
            .find(|t| t.band == band)
            .map(|t| t.final_status.clone())
            .unwrap()
    };
    assert_eq!(report.traces.len(), 3);
    assert_eq!(status(Band::lte(2)), FinalStatus::Enabled);
    assert_eq!(status(Band::lte(66)), FinalStatus::Enabled);
    assert_eq!(status(Band::lte(7)), FinalStatus::FilteredAt("Carrier".to_string()));
    assert_eq!(report.summary.filtered_by_stage["Carrier"], 1);
}

#[test]
fn test_comparison_chain() {
    let report = run();
    assert_eq!(report.comparisons.len(), 2);

    let first = &report.comparisons[0];
    assert_eq!(first.reference, ComboRole::Declared);
    assert_eq!(first.target, ComboRole::Filtered);
    let only_in_a: Vec<&str> = first.overall.only_in_a.keys().collect();
    assert_eq!(only_in_a, vec!["1A-3A", "7A-66A"]);
    let only_in_b: Vec<&str> = first.overall.only_in_b.keys().collect();
    assert_eq!(only_in_b, vec!["14A-66A"]);
    assert_eq!(first.overall.common.len(), 3);
    assert_eq!(first.by_category.len(), 2);

    let second = &report.comparisons[1];
    assert_eq!(second.reference, ComboRole::Filtered);
    assert_eq!(second.target, ComboRole::Advertised);
    assert!(second.overall.only_in_b.is_empty());

    assert_eq!(report.summary.combos_by_role["declared"], 5);
    assert_eq!(report.summary.combos_by_role["filtered"], 4);
}

#[test]
fn test_enriched_discrepancies() {
    let report = run();
    assert_eq!(report.discrepancies.len(), 6);
    assert!(report.discrepancies.iter().all(|d| d.is_enriched()));

    let pruned = find(&report, "1A-3A", "declared");
    assert_eq!(pruned.category, DiscrepancyCategory::PrunedBySoftwareRule);
    assert_eq!(pruned.severity, Severity::Expected);

    let carrier = find(&report, "7A-66A", "declared");
    assert_eq!(carrier.reason_type.as_deref(), Some("carrier_exclusion"));
    assert_eq!(carrier.severity, Severity::Expected);
    assert_eq!(carrier.detail.as_deref(), Some("bands not enabled: B7"));

    let mmwave = find(&report, "2A-n261A", "filtered");
    assert_eq!(mmwave.reason_type.as_deref(), Some("heuristic"));
    assert_eq!(mmwave.severity, Severity::Low);

    let attribute = report
        .discrepancies
        .iter()
        .find(|d| d.category == DiscrepancyCategory::AttributeMismatch)
        .unwrap();
    assert_eq!(attribute.subject.to_string(), "66A-n77A");
    assert_eq!(attribute.detail.as_deref(), Some("n77A dl_mimo: 4 vs 2"));
    assert_eq!(attribute.severity, Severity::High);
    assert!(!attribute.is_explained());

    assert_eq!(report.summary.unexplained, 1);
    assert_eq!(report.summary.severity_counts["Expected"], 2);
    assert_eq!(report.summary.severity_counts["Low"], 3);
}

#[test]
fn test_action_items_and_failures() {
    let report = run();

    assert_eq!(report.action_items.len(), 4);
    assert_eq!(report.action_items[0].severity, Severity::High);
    assert_eq!(report.action_items[0].subject, "66A-n77A");

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].source, "rrc_combos");
    assert_eq!(report.failures[0].line, Some(5));
    assert_eq!(report.documents.len(), 8);
}

#[test]
fn test_attribute_checks_can_be_disabled() {
    let input = AnalysisInput::from_json(MANIFEST).unwrap();
    let config = AnalysisConfig {
        check_attributes: false,
        ..Default::default()
    };
    let report = Analyzer::with_config(config).run(&input).unwrap();
    assert!(report
        .discrepancies
        .iter()
        .all(|d| d.category != DiscrepancyCategory::AttributeMismatch));

    // without the carrier rules the B7 combo stays unexplained
    let b7 = find(&report, "7A-66A", "declared");
    assert_eq!(b7.severity, Severity::High);
}

#[test]
fn test_json_report() {
    let report = run();
    let json = generate_report(&report, ReportFormat::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["id"], report.id.to_string());
    assert_eq!(value["summary"]["bands_traced"], 3);
    assert_eq!(value["context"]["carrier"], "carrierx");
    assert!(value["controls"].is_null());

    let compact = generate_report(&report, ReportFormat::CompactJson).unwrap();
    assert!(!compact.contains('\n'));
}

const DEVICE_MANIFEST: &str = r##"{
    "combo_sources": [
        {"role": "filtered", "name": "rrc_report", "format": "capability_report",
         "text": "LTE-CA: B66A[4]+B2A\nLTE-CA: 7A-12A BCS=1\nLTE-CA: 4A-5A BCS=2\n"},
        {"role": "advertised", "name": "uecap_xml", "format": "ue_capability_xml",
         "text": "<UECapabilityInformation><supportedBandCombination-r10><BandCombinationParameters-r10><BandParameters-r10><bandEUTRA-r10>2</bandEUTRA-r10></BandParameters-r10><BandParameters-r10><bandEUTRA-r10>66</bandEUTRA-r10><supportedMIMO-CapabilityDL-r10>twoLayers</supportedMIMO-CapabilityDL-r10></BandParameters-r10></BandCombinationParameters-r10></supportedBandCombination-r10></UECapabilityInformation>"}
    ],
    "prune_lists": [
        {"name": "prune_ca_combos", "text": "7A-12A-0;4A-5A-2;"}
    ],
    "controls": [
        {"name": "disable_4l_per_band", "file": "disable_4l_per_band", "text": "66\n"},
        {"name": "ca_disable", "file": "ca_disable", "bytes": [0]}
    ]
}"##;

#[test]
fn test_device_controls_and_bcs() {
    let input = AnalysisInput::from_json(DEVICE_MANIFEST).unwrap();
    let report = Analyzer::default().run(&input).unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(report.documents.len(), 5);
    let controls = report.controls.as_ref().unwrap();
    assert!(!controls.ca_disabled);
    assert!(controls.disabled_4l_bands.contains(&Band::lte(66)));

    assert_eq!(report.discrepancies.len(), 3);

    let pruned = find(&report, "4A-5A", "filtered");
    assert_eq!(pruned.category, DiscrepancyCategory::PrunedBySoftwareRule);
    assert_eq!(pruned.severity, Severity::Expected);

    // listed for BCS 0 only, the report says BCS 1
    let mismatch = find(&report, "7A-12A", "filtered");
    assert_eq!(mismatch.category, DiscrepancyCategory::MissingInTarget);
    assert_eq!(mismatch.reason_type.as_deref(), Some("bcs_mismatch"));
    assert_eq!(mismatch.severity, Severity::Medium);

    let mimo = find(&report, "2A-66A", "filtered");
    assert_eq!(mimo.category, DiscrepancyCategory::AttributeMismatch);
    assert_eq!(mimo.detail.as_deref(), Some("66A dl_mimo: 4 vs 2"));
    assert_eq!(mimo.reason_type.as_deref(), Some("software_control"));
    assert_eq!(mimo.severity, Severity::Expected);

    assert_eq!(report.action_items.len(), 1);
    assert_eq!(report.summary.unexplained, 0);
}
