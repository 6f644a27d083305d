use lib_aggregator::{Aggregator, Daq, Flashlist, FlashlistType, SessionContext};
use project_tests::{build_daq, bu_row, ferol_configuration_row, input_stream_row, ru_row, SESSION_ID};
use serde_json::json;

fn aggregator() -> Aggregator {
    Aggregator::new(build_daq(), SessionContext::new("toppro"))
}

fn fed(daq: &Daq, id: u32) -> &lib_aggregator::model::Fed {
    daq.fed_by_id(id).unwrap()
}

#[test]
fn builder_units_are_found_by_hostname() {
    let mut aggregator = aggregator();
    let rows = vec![bu_row("host1:0:1234", 12.0), bu_row("host3:0:1234", 99.0)];

    let daq = aggregator.run_cycle(vec![Flashlist::new(FlashlistType::Bu, rows)], 1);

    let host1 = daq.bus.iter().find(|bu| bu.hostname == "host1").unwrap();
    let host2 = daq.bus.iter().find(|bu| bu.hostname == "host2").unwrap();
    assert_eq!(host1.rate, 12.0);
    assert_eq!(host1.port, 1234);
    assert_eq!(host2.rate, 0.0);
    let stats = aggregator.reporter().stats(FlashlistType::Bu);
    assert_eq!((stats.matched(), stats.missing), (1, 1));
}

#[test]
fn ru_problem_lists_flag_each_listed_fed_once() {
    let mut aggregator = aggregator();
    let mut row = ru_row("ru-2", 10.0, 1);
    row["fedIdsWithErrors"] = json!([7, 9]);
    row["fedIdsWithoutFragments"] = json!([9, 12]);

    let daq = aggregator.run_cycle(vec![Flashlist::new(FlashlistType::Ru, vec![row])], 1);

    assert!(fed(&daq, 7).ru_fed_in_error);
    assert!(!fed(&daq, 7).ru_fed_without_fragments);
    assert!(fed(&daq, 9).ru_fed_in_error);
    assert!(fed(&daq, 9).ru_fed_without_fragments);
    assert!(fed(&daq, 12).ru_fed_without_fragments);
    assert!(!fed(&daq, 13).ru_fed_in_error);

    let stats = aggregator.reporter().stats(FlashlistType::Ru);
    assert_eq!((stats.total, stats.missing), (1, 0));
    assert_eq!((stats.list_entries, stats.missing_list_entries), (4, 0));
}

#[test]
fn ru_problem_flags_follow_the_latest_lists() {
    let mut aggregator = aggregator();
    let mut listed = ru_row("ru-2", 10.0, 1);
    listed["fedIdsWithErrors"] = json!([12]);
    listed["fedIdsWithoutFragments"] = json!([13]);

    let daq = aggregator.run_cycle(vec![Flashlist::new(FlashlistType::Ru, vec![listed])], 1);
    assert!(fed(&daq, 12).ru_fed_in_error);
    assert!(fed(&daq, 13).ru_fed_without_fragments);

    let daq = aggregator.run_cycle(vec![Flashlist::new(FlashlistType::Ru, vec![ru_row("ru-2", 10.0, 1)])], 2);
    assert!(!fed(&daq, 12).ru_fed_in_error);
    assert!(!fed(&daq, 13).ru_fed_without_fragments);
}

#[test]
fn accumulated_backpressure_moves_only_on_new_timestamps() {
    let mut aggregator = aggregator();
    let mut cycle = |timestamp: &str, acc: f64| {
        let rows = vec![input_stream_row(5, 0, timestamp, acc, 1)];
        let daq = aggregator.run_cycle(vec![Flashlist::new(FlashlistType::FerolInputStream, rows)], 1);
        fed(&daq, 7).percent_backpressure
    };

    let first = cycle("T0", 100.0);
    assert_eq!(cycle("T0", 150.0), first);
    assert_eq!(cycle("T1", 150.0), 50.0);
}

fn mask_cycle(aggregator: &mut Aggregator, slot6: (bool, bool), slot7: bool) -> std::sync::Arc<Daq> {
    let rows = vec![
        ferol_configuration_row(6, slot6.0, slot6.1),
        ferol_configuration_row(7, slot7, true),
    ];
    aggregator.run_cycle(vec![Flashlist::new(FlashlistType::FerolConfiguration, rows)], 1)
}

#[test]
fn ru_is_masked_when_all_its_feds_are_masked() {
    let mut aggregator = aggregator();

    let daq = mask_cycle(&mut aggregator, (false, false), false);
    assert!(daq.ru_by_hostname("ru-2").unwrap().masked);
    // FB-1 received no configuration row, so none of its FEDs is masked.
    assert!(!daq.ru_by_hostname("ru-1").unwrap().masked);

    let daq = mask_cycle(&mut aggregator, (false, false), true);
    assert!(!fed(&daq, 14).frl_masked);
    assert!(!daq.ru_by_hostname("ru-2").unwrap().masked);
}

#[test]
fn tables_with_several_routes_count_each_row_once() {
    let mut aggregator = aggregator();
    let mut stranger = ferol_configuration_row(5, true, true);
    stranger["context"] = json!("http://frlpc-9:11100");
    let rows = vec![ferol_configuration_row(6, true, true), ferol_configuration_row(7, true, true), stranger];

    aggregator.run_cycle(vec![Flashlist::new(FlashlistType::FerolConfiguration, rows)], 1);

    let stats = aggregator.reporter().stats(FlashlistType::FerolConfiguration);
    assert_eq!((stats.total, stats.matched(), stats.missing), (3, 2, 1));
}

#[test]
fn level_zero_rows_are_filtered_by_instance_and_session() {
    let mut aggregator = aggregator();
    let dynamic = Flashlist::new(
        FlashlistType::LevelZeroFmDynamic,
        vec![
            json!({"FMURL": "http://cmsrc-top.cms:16000/rcms/gui/servlet/FMPilotServlet?PAGE=toppro",
                   "SID": SESSION_ID, "RUN_NUMBER": 315000, "STATE": "Running",
                   "LHC_MACHINE_MODE": "PROTON PHYSICS", "LHC_BEAM_MODE": "STABLE BEAMS"}),
            json!({"FMURL": "http://cmsrc-minidaq.cms:16000/minidaq", "SID": 12, "RUN_NUMBER": 1, "STATE": "Halted"}),
        ],
    );
    let subsystems = Flashlist::new(
        FlashlistType::LevelZeroFmSubsys,
        vec![
            json!({"SID": SESSION_ID.to_string(), "SUBSYS": "ECAL", "STATE": "Running", "FMURL": "x"}),
            json!({"SID": "12", "SUBSYS": "HCAL", "STATE": "Error", "FMURL": "x"}),
            json!({"SID": SESSION_ID.to_string(), "SUBSYS": "DAQ", "STATE": "Running",
                   "FMURL": "http://cmsrc-top.cms:16000/toppro"}),
            json!({"SID": SESSION_ID.to_string(), "SUBSYS": "PIXEL", "STATE": "Running", "FMURL": "x"}),
        ],
    );

    // Subsystem table first: the cycle still dispatches the dynamic table ahead of it.
    let daq = aggregator.run_cycle(vec![subsystems, dynamic], 1);

    assert_eq!(daq.run.run_number, Some(315000));
    assert_eq!(daq.run.level_zero_state.as_deref(), Some("Running"));
    assert_eq!(daq.run.lhc_beam_mode.as_deref(), Some("STABLE BEAMS"));
    assert_eq!(daq.run.daq_state.as_deref(), Some("Running"));
    let status = |name: &str| daq.sub_systems.iter().find(|s| s.name == name).and_then(|s| s.status.clone());
    assert_eq!(status("ECAL").as_deref(), Some("Running"));
    assert_eq!(status("HCAL"), None);

    let stats = aggregator.reporter().stats(FlashlistType::LevelZeroFmSubsys);
    assert_eq!((stats.matched(), stats.missing), (2, 1));
}

#[test]
fn tcds_tables_follow_the_configured_partition_manager() {
    let session = SessionContext::new("toppro").with_tcds("cpm-pri", "http://tcds-cpm.cms:2050");
    let mut aggregator = Aggregator::new(build_daq(), session);
    let rates = Flashlist::new(
        FlashlistType::TcdsCpmRates,
        vec![
            json!({"service": "cpm-sec", "trg_rate_total": 1.0, "sup_trg_rate_total": 0.0, "trg_rate_beamactive_total": 0.0}),
            json!({"service": "CPM-PRI", "trg_rate_total": 100000.0, "sup_trg_rate_total": 5.0,
                   "trg_rate_beamactive_total": 99000.0}),
        ],
    );

    let daq = aggregator.run_cycle(vec![rates.clone()], 1);
    assert_eq!(daq.tcds_global_info.trg_rate_total, 100000.0);

    let mut without_tcds = Aggregator::new(build_daq(), SessionContext::new("toppro"));
    let daq = without_tcds.run_cycle(vec![rates], 1);
    assert_eq!(daq.tcds_global_info.trg_rate_total, 0.0);
    assert!(without_tcds.reporter().snapshot().is_empty());
}
