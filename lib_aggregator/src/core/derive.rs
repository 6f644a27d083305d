//! Derived metrics, recomputed from scratch after every flashlist of a cycle
//! has been applied. Parents first (trigger ranges, RU masking), then the
//! system-wide summaries, which read the per-unit values only.

use crate::model::{BuSummary, Daq, FedBuilderSummary, SubFedBuilderId};

/// Runs both phases of the derived pass over `daq`.
pub fn calculate_derived_values(daq: &mut Daq) {
    update_trigger_ranges(daq);
    update_ru_masking(daq);
    daq.fed_builder_summary = summarize_readout_units(daq);
    daq.bu_summary = summarize_builder_units(daq);
}

fn update_trigger_ranges(daq: &mut Daq) {
    let ranges: Vec<Vec<u64>> = (0..daq.sub_fed_builders.len())
        .map(|i| {
            daq.sub_fed_builder_feds(SubFedBuilderId::from_index(i))
                .map(|fed| fed.event_counter)
                .collect()
        })
        .collect();
    for (sub_fed_builder, counters) in daq.sub_fed_builders.iter_mut().zip(ranges) {
        sub_fed_builder.set_trigger_range(counters);
    }
}

/// An RU is masked when every FED of its FED builder is masked at the FRL.
/// An RU without FEDs is not masked.
fn update_ru_masking(daq: &mut Daq) {
    let masked: Vec<bool> = daq
        .rus
        .iter()
        .map(|ru| {
            let (total, frl_masked) = daq
                .fed_builder_feds(ru.fed_builder)
                .fold((0usize, 0usize), |(total, masked), fed| (total + 1, masked + usize::from(fed.frl_masked)));
            total > 0 && frl_masked == total
        })
        .collect();
    for (ru, masked) in daq.rus.iter_mut().zip(masked) {
        ru.masked = masked;
    }
}

/// Spread of the event counts: the highest count minus the lowest non-zero
/// one. Zero when no unit has counted an event yet.
pub fn delta_events(counts: impl IntoIterator<Item = u64>) -> u64 {
    let mut max = 0;
    let mut min_non_zero: Option<u64> = None;
    for count in counts {
        max = max.max(count);
        if count != 0 {
            min_non_zero = Some(min_non_zero.map_or(count, |min| min.min(count)));
        }
    }
    min_non_zero.map_or(0, |min| max - min)
}

fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn summarize_readout_units(daq: &Daq) -> FedBuilderSummary {
    let rus = &daq.rus;
    let mut summary = FedBuilderSummary {
        delta_events: delta_events(rus.iter().map(|ru| ru.events_in_ru)),
        ..FedBuilderSummary::default()
    };
    let (mut rate, mut size, mut stddev) = (0.0, 0.0, 0.0);
    for ru in rus {
        rate += ru.rate;
        size += ru.super_fragment_size_mean;
        stddev += ru.super_fragment_size_stddev;
        summary.throughput += ru.throughput;
        summary.sum_events_in_ru += ru.events_in_ru;
        summary.sum_fragments_in_ru += ru.fragments_in_ru;
        summary.sum_requests += ru.requests;
    }
    summary.rate = mean(rate, rus.len());
    summary.super_fragment_size_mean = mean(size, rus.len());
    summary.super_fragment_size_stddev = mean(stddev, rus.len());
    summary
}

fn summarize_builder_units(daq: &Daq) -> BuSummary {
    let mut summary = BuSummary { number_of_bus: daq.bus.len(), ..BuSummary::default() };
    let mut size = 0.0;
    for bu in &daq.bus {
        summary.rate += bu.rate;
        summary.throughput += bu.throughput;
        summary.events_in_bu += bu.events_in_bu;
        summary.events_built += bu.events_built;
        size += bu.event_size_mean;
    }
    summary.event_size_mean = mean(size, daq.bus.len());
    summary
}
