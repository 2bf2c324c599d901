use divrank::team_matcher::{AgeBand, MatchTier, RegistryEntry, TeamRegistry};
use divrank::team_normalizer::normalize_team_name;

fn entry(name: &str, band: AgeBand) -> RegistryEntry {
    RegistryEntry {
        team_key: normalize_team_name(name),
        display_name: name.to_string(),
        state: Some("az".to_string()),
        external_id: None,
        band,
    }
}

fn registry(names: &[&str]) -> TeamRegistry {
    TeamRegistry::new(names.iter().map(|n| entry(n, AgeBand::Own)).collect())
}

#[test]
fn exact_tier_matches_the_canonical_key() {
    let reg = registry(&["Phoenix United 2015 Premier", "Desert Foothills SC 2015"]);
    let res = reg.resolve("phoenix UNITED 2015 premier").unwrap();
    assert_eq!(res.tier, MatchTier::Exact);
    assert!((res.confidence - 1.0).abs() < 1e-12);
    assert_eq!(res.team_key, normalize_team_name("Phoenix United 2015 Premier"));
}

#[test]
fn abbreviated_name_resolves_through_the_normalized_tier() {
    // Same club, upstream spelling: "PHX UTD 2015 PREMIER".
    let reg = registry(&["Phoenix United 2015 Premier", "Tucson Rush 2015"]);
    let res = reg.resolve("PHX UTD 2015 PREMIER").unwrap();
    assert!(
        matches!(res.tier, MatchTier::Normalized | MatchTier::Fuzzy(_)),
        "resolved as {:?}",
        res.tier
    );
    assert!(res.confidence >= 0.85);
    assert_eq!(res.team_key, normalize_team_name("Phoenix United 2015 Premier"));
}

#[test]
fn fuzzy_tier_requires_085_token_set_similarity() {
    let reg = registry(&["north valley storm 2014 red white blue gold"]);
    // 6 of 8 tokens shared: IoU 6/8 < 0.85, must synthesize an external.
    let res = reg.resolve("north valley storm 2014 red white").unwrap();
    assert_eq!(res.tier, MatchTier::External);
    assert!(res.team_key.starts_with("ext::"));

    // 8 of 9 registry tokens shared: IoU 8/9 >= 0.85.
    let res = reg
        .resolve("north valley storm 2014 red white blue gold extra")
        .unwrap();
    match res.tier {
        MatchTier::Fuzzy(score) => assert!(score >= 0.85),
        other => panic!("expected fuzzy tier, got {other:?}"),
    }
}

#[test]
fn adding_an_entry_never_weakens_an_exact_match() {
    let reg = registry(&["Phoenix United 2015 Premier"]);
    let before = reg.resolve("Phoenix United 2015 Premier").unwrap();

    let reg = registry(&["Phoenix United 2015 Premier", "Phoenix United 2015"]);
    let after = reg.resolve("Phoenix United 2015 Premier").unwrap();

    assert_eq!(before.tier, MatchTier::Exact);
    assert_eq!(after.tier, MatchTier::Exact);
    assert!(after.confidence >= before.confidence);
}

#[test]
fn empty_opponent_name_is_a_schema_error() {
    let reg = registry(&["Phoenix United 2015 Premier"]);
    assert!(reg.resolve("   ").is_err());
    assert!(reg.resolve("").is_err());
}

#[test]
fn duplicate_keys_collapse_first_wins() {
    let reg = TeamRegistry::new(vec![
        entry("Phoenix United 2015 Premier", AgeBand::Own),
        entry("PHOENIX UNITED 2015 PREMIER", AgeBand::Older),
    ]);
    assert_eq!(reg.entries().len(), 1);
    assert_eq!(reg.entries()[0].band, AgeBand::Own);

    let key = normalize_team_name("Phoenix United 2015 Premier");
    let kept = reg.lookup_key(&key).unwrap();
    assert_eq!(kept.display_name, "Phoenix United 2015 Premier");
}

#[test]
fn own_roster_outranks_adjacent_on_ties() {
    let reg = TeamRegistry::new(vec![
        entry("Scottsdale Blast 2015", AgeBand::Older),
        entry("Scottsdale Blast 2015", AgeBand::Own),
    ]);
    let res = reg.resolve("Scottsdale Blast 2015").unwrap();
    assert_eq!(res.band, Some(AgeBand::Own));
}

#[test]
fn unresolvable_opponent_synthesizes_a_stable_external_key() {
    let reg = registry(&["Phoenix United 2015 Premier"]);
    let first = reg.resolve("Las Vegas Legends 2015").unwrap();
    let second = reg.resolve("las vegas LEGENDS 2015").unwrap();
    assert_eq!(first.tier, MatchTier::External);
    assert_eq!(first.team_key, second.team_key);
    assert_eq!(first.confidence_label(None), "external:unresolved");
    assert_eq!(first.confidence_label(Some("8841")), "external:8841");
}
