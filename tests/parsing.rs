use divrank::history_fetch::{parse_history_json, parse_search_results, select_search_candidate};
use divrank::match_table::{read_gold, sort_and_dedup, write_gold, AgeContext, MatchRow};
use divrank::roster_fetch::{dedup_roster, extract_roster, parse_roster_html, parse_roster_json};
use divrank::team_normalizer::normalize_team_name;

const HISTORY_JSON: &str = r#"[
  {
    "title": "Tuzos Academy GTA 2016 vs. Southeast 2016 Boys Black",
    "matchTime": "2025-04-12T16:00:00Z",
    "home_score": 3,
    "away_score": 1,
    "event": { "name": "Spring Classic" }
  },
  {
    "home_team": "Desert Foothills SC 2016",
    "away_team": "Tuzos Academy GTA 2016",
    "match_time": "2025-03-02",
    "home_score": "0",
    "away_score": "2",
    "event_name": "State League"
  },
  {
    "title": "Tuzos Academy GTA 2016 vs. Forfeit FC",
    "matchTime": "2025-02-01T09:00:00Z",
    "home_score": "W",
    "away_score": 0
  },
  {
    "title": "no separator here",
    "matchTime": "2025-02-02T09:00:00Z",
    "home_score": 1,
    "away_score": 0
  }
]"#;

#[test]
fn history_rows_parse_and_bad_rows_drop() {
    let (matches, dropped) = parse_history_json(HISTORY_JSON).unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(dropped.len(), 2);

    let first = &matches[0];
    assert_eq!(first.home_team, "Tuzos Academy GTA 2016");
    assert_eq!(first.away_team, "Southeast 2016 Boys Black");
    assert_eq!(first.home_score, 3);
    assert_eq!(first.date.to_string(), "2025-04-12");
    assert_eq!(first.competition, "Spring Classic");

    let second = &matches[1];
    assert_eq!(second.away_score, 2);
    assert_eq!(second.competition, "State League");
}

#[test]
fn empty_history_means_no_past_matches() {
    let (matches, dropped) = parse_history_json("null").unwrap();
    assert!(matches.is_empty());
    assert!(dropped.is_empty());
    let (matches, _) = parse_history_json("[]").unwrap();
    assert!(matches.is_empty());
}

#[test]
fn roster_json_extracts_team_tuples() {
    let body = r#"{"teams": [
        {"teamName": "Phoenix United 2015 Premier", "teamId": 4711, "club": "Phoenix United", "state": "AZ"},
        {"teamName": "Tucson Rush 2015", "teamUrl": "https://rankings.example.com/teams/4712/game-history"},
        {"club": "No Name FC"}
    ]}"#;
    let teams = parse_roster_json(body).unwrap();
    assert_eq!(teams.len(), 2);
    assert_eq!(teams[0].external_id.as_deref(), Some("4711"));
    assert_eq!(teams[0].state.as_deref(), Some("AZ"));
    assert_eq!(teams[1].external_id.as_deref(), Some("4712"));
}

#[test]
fn roster_html_extracts_the_ranking_table() {
    let body = r#"
    <html><body><table>
      <tr><th>Rank</th><th>ID</th><th>Team</th><th>Points</th></tr>
      <tr><td>1</td><td>4711</td><td><a href="/teams/4711">Phoenix United 2015 Premier</a></td><td>120</td></tr>
      <tr><td>2</td><td></td><td>Tucson Rush 2015</td><td>95</td></tr>
    </table></body></html>"#;
    let teams = parse_roster_html(body);
    assert_eq!(teams.len(), 2);
    assert_eq!(teams[0].external_id.as_deref(), Some("4711"));
    assert_eq!(teams[0].name, "Phoenix United 2015 Premier");
    assert!(teams[1].external_id.is_none());
}

#[test]
fn content_type_probe_falls_back() {
    let json = r#"[{"teamName": "Phoenix United 2015 Premier", "teamId": 1}]"#;
    // Upstream mislabels the JSON as html; the probe still finds it.
    let teams = extract_roster(json, "text/html").unwrap();
    assert_eq!(teams.len(), 1);
}

#[test]
fn roster_dedup_is_keyed_and_flagged() {
    let body = r#"[
        {"teamName": "Phoenix United 2015 Premier", "teamId": 1},
        {"teamName": "PHOENIX  UNITED 2015 PREMIER", "teamId": 1},
        {"teamName": "Tucson Rush 2015"}
    ]"#;
    let teams = dedup_roster(parse_roster_json(body).unwrap(), "az");
    assert_eq!(teams.len(), 2);
    let rush = teams
        .iter()
        .find(|t| t.team_key == normalize_team_name("Tucson Rush 2015"))
        .unwrap();
    assert!(rush.external_id.is_none());
    assert_eq!(rush.state, "az");
}

#[test]
fn search_candidates_rank_exact_over_overlap() {
    let body = r#"
    <html><body>
      <a href="/teams/100">Phoenix United 2015 Premier</a>
      <a href="/teams/200">Phoenix United 2016 Premier</a>
      <a href="/search?page=2">next</a>
    </body></html>"#;
    let candidates = parse_search_results(body);
    assert_eq!(candidates.len(), 2);

    let key = normalize_team_name("Phoenix United 2015 Premier");
    assert_eq!(
        select_search_candidate(&key, &candidates, 0.60).as_deref(),
        Some("100")
    );

    // Nothing clears the overlap floor for an unrelated query.
    let other = normalize_team_name("Flagstaff Alpine 2012");
    assert_eq!(select_search_candidate(&other, &candidates, 0.60), None);
}

#[test]
fn gold_files_round_trip_and_rewrite_identically() {
    let mut rows = vec![
        MatchRow {
            date: "2025-03-15".parse().unwrap(),
            team_a_key: "zulu".into(),
            team_a_name: "ZULU".into(),
            team_b_key: "alpha".into(),
            team_b_name: "ALPHA".into(),
            score_a: 0,
            score_b: 3,
            competition: "league".into(),
            source_url: "https://example.com".into(),
            age_context: AgeContext::Own,
            match_confidence: "fuzzy:0.91".into(),
        }
        .into_canonical(),
        MatchRow {
            date: "2025-03-01".parse().unwrap(),
            team_a_key: "alpha".into(),
            team_a_name: "ALPHA".into(),
            team_b_key: "zulu".into(),
            team_b_name: "ZULU".into(),
            score_a: 2,
            score_b: 1,
            competition: "league".into(),
            source_url: "https://example.com".into(),
            age_context: AgeContext::Own,
            match_confidence: "exact".into(),
        },
    ];
    sort_and_dedup(&mut rows);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("matches_test.csv");
    write_gold(&path, &rows).unwrap();
    let first = std::fs::read(&path).unwrap();

    let reread = read_gold(&path).unwrap();
    assert_eq!(reread.len(), rows.len());
    for row in &reread {
        assert!(row.team_a_key <= row.team_b_key);
    }

    write_gold(&path, &reread).unwrap();
    let second = std::fs::read(&path).unwrap();
    assert_eq!(first, second);
}

#[test]
fn malformed_gold_is_rejected_whole() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("matches_bad.csv");
    std::fs::write(
        &path,
        "date,team_a_key,team_a_name,team_b_key,team_b_name,score_a,score_b,competition,source_url,age_context,match_confidence\n\
         2025-03-01,alpha,ALPHA,bravo,BRAVO,two,1,league,,own,exact\n",
    )
    .unwrap();
    assert!(read_gold(&path).is_err());
}
