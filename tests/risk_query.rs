mod common;

use common::{analyst, assessed_risk, new_risk, register};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use risk_register::model::{
    Criticality, ImpactLevel, Page, ProbabilityLevel, RiskFilter, RiskSort, RiskSortField,
    RiskSource,
};
use risk_register::RiskRegister;

fn seeded(levels: &[(u8, u8)]) -> RiskRegister {
    let register = register();
    let actor = analyst();
    for (n, (p, i)) in levels.iter().enumerate() {
        let p = ProbabilityLevel::from_value(*p).unwrap();
        let i = ImpactLevel::from_value(*i).unwrap();
        register
            .risks
            .create(assessed_risk(&format!("Risk {n}"), p, i), &actor)
            .unwrap();
    }
    register
}

#[test]
fn text_search_is_case_insensitive_and_literal() {
    let register = register();
    let actor = analyst();
    register.risks.create(new_risk("Fraud in procurement"), &actor).unwrap();
    register.risks.create(new_risk("100% vendor dependency"), &actor).unwrap();
    register.risks.create(new_risk("Flood"), &actor).unwrap();

    let filter = RiskFilter {
        text: Some("FRAUD".into()),
        ..RiskFilter::default()
    };
    let (found, total) = register.risks.query(&filter, RiskSort::default(), Page::all()).unwrap();
    assert_eq!(total, 1);
    assert_eq!(found[0].title, "Fraud in procurement");

    // `%` is a literal, not a wildcard
    let filter = RiskFilter {
        text: Some("0% v".into()),
        ..RiskFilter::default()
    };
    let (found, _) = register.risks.query(&filter, RiskSort::default(), Page::all()).unwrap();
    assert_eq!(found.len(), 1);
}

#[test]
fn text_search_folds_accented_letters() {
    let register = register();
    let actor = analyst();
    register.risks.create(new_risk("AÇÃO judicial trabalhista"), &actor).unwrap();
    register.risks.create(new_risk("Atraso na obra"), &actor).unwrap();

    for needle in ["ação", "AÇÃO", "ção JUDICIAL"] {
        let filter = RiskFilter {
            text: Some(needle.into()),
            ..RiskFilter::default()
        };
        let (found, total) = register.risks.query(&filter, RiskSort::default(), Page::all()).unwrap();
        assert_eq!(total, 1, "searching {needle:?}");
        assert_eq!(found[0].title, "AÇÃO judicial trabalhista");
    }
}

#[test]
fn identification_range_includes_both_ends() {
    let register = register();
    let actor = analyst();
    let day = |d: u32| Utc.with_ymd_and_hms(2024, 3, d, 9, 0, 0).unwrap();
    for (title, d) in [("Before", 1), ("On start", 5), ("Inside", 10), ("On end", 20), ("After", 25)] {
        register
            .risks
            .create(new_risk(title).identified_on(day(d)), &actor)
            .unwrap();
    }

    let titles = |filter: RiskFilter| -> (Vec<String>, u64) {
        let (found, total) = register
            .risks
            .query(&filter, RiskSort::ascending(RiskSortField::IdentifiedAt), Page::all())
            .unwrap();
        (found.into_iter().map(|r| r.title).collect(), total)
    };

    let (found, total) = titles(RiskFilter {
        identified_from: Some(day(5)),
        identified_to: Some(day(20)),
        ..RiskFilter::default()
    });
    assert_eq!(found, vec!["On start", "Inside", "On end"]);
    assert_eq!(total, 3);

    let (found, _) = titles(RiskFilter {
        identified_from: Some(day(20)),
        ..RiskFilter::default()
    });
    assert_eq!(found, vec!["On end", "After"]);

    let (found, _) = titles(RiskFilter {
        identified_to: Some(day(1)),
        ..RiskFilter::default()
    });
    assert_eq!(found, vec!["Before"]);

    let (found, total) = titles(RiskFilter {
        identified_from: Some(day(11)),
        identified_to: Some(day(19)),
        ..RiskFilter::default()
    });
    assert!(found.is_empty());
    assert_eq!(total, 0);
}

#[test]
fn filters_combine() {
    let register = seeded(&[(5, 5), (4, 5), (1, 1), (3, 3)]);
    let filter = RiskFilter {
        criticality: vec![Criticality::Critical, Criticality::Medium],
        source: Some(RiskSource::Operational),
        eap: Some("1.4".into()),
        ..RiskFilter::active_only()
    };
    let (found, total) = register
        .risks
        .query(&filter, RiskSort::ascending(RiskSortField::Id), Page::all())
        .unwrap();
    assert_eq!(total, 3);
    assert!(found.iter().all(|r| r.criticality != Some(Criticality::Low)));

    let filter = RiskFilter {
        source: Some(RiskSource::Legal),
        ..RiskFilter::default()
    };
    let (found, total) = register.risks.query(&filter, RiskSort::default(), Page::all()).unwrap();
    assert!(found.is_empty());
    assert_eq!(total, 0);
}

#[test]
fn active_filter_is_optional() {
    let register = seeded(&[(1, 1), (2, 2)]);
    register.risks.deactivate(1, &analyst()).unwrap();

    let (all, _) = register
        .risks
        .query(&RiskFilter::default(), RiskSort::default(), Page::all())
        .unwrap();
    let (active, _) = register
        .risks
        .query(&RiskFilter::active_only(), RiskSort::default(), Page::all())
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(active.len(), 1);
}

#[test]
fn criticality_sort_is_ordinal() {
    let register = seeded(&[(1, 1), (5, 5), (3, 3), (4, 4)]);
    let (found, _) = register
        .risks
        .query(
            &RiskFilter::default(),
            RiskSort::descending(RiskSortField::Criticality),
            Page::all(),
        )
        .unwrap();
    let tiers: Vec<Option<Criticality>> = found.iter().map(|r| r.criticality).collect();
    assert_eq!(
        tiers,
        vec![
            Some(Criticality::Critical),
            Some(Criticality::High),
            Some(Criticality::Medium),
            Some(Criticality::Low),
        ]
    );
}

#[test]
fn inverted_date_range_is_rejected() {
    let register = register();
    let now = Utc::now();
    let filter = RiskFilter {
        identified_from: Some(now),
        identified_to: Some(now - chrono::Duration::days(1)),
        ..RiskFilter::default()
    };
    assert!(register
        .risks
        .query(&filter, RiskSort::default(), Page::all())
        .is_err());
}

fn sort_fields() -> impl Strategy<Value = RiskSort> {
    let field = prop_oneof![
        Just(RiskSortField::Id),
        Just(RiskSortField::Code),
        Just(RiskSortField::Title),
        Just(RiskSortField::Criticality),
        Just(RiskSortField::IdentifiedAt),
    ];
    (field, any::<bool>()).prop_map(|(field, desc)| {
        if desc {
            RiskSort::descending(field)
        } else {
            RiskSort::ascending(field)
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn pages_concatenate_to_full_result(
        levels in prop::collection::vec((1u8..=5, 1u8..=5), 0..18),
        page_size in 1u64..7,
        sort in sort_fields(),
    ) {
        let register = seeded(&levels);
        let filter = RiskFilter::default();
        let (full, full_total) = register.risks.query(&filter, sort, Page::all()).unwrap();
        prop_assert_eq!(full_total, levels.len() as u64);

        let mut paged = Vec::new();
        let mut offset = 0;
        loop {
            let (page, total) = register
                .risks
                .query(&filter, sort, Page::new(offset, page_size))
                .unwrap();
            prop_assert_eq!(total, full_total);
            if page.is_empty() {
                break;
            }
            prop_assert!(page.len() as u64 <= page_size);
            offset += page.len() as u64;
            paged.extend(page.into_iter().map(|r| r.id));
        }

        let full_ids: Vec<i64> = full.iter().map(|r| r.id).collect();
        prop_assert_eq!(paged, full_ids);
    }
}
