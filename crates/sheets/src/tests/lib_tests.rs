use super::*;

fn range(min_row: u32, max_row: Option<u32>, min_col: u32, max_col: u32) -> CellRange {
    CellRange {
        min_row,
        max_row,
        min_col,
        max_col,
        include_empty: true,
    }
}

#[test]
fn column_letters_cover_single_and_double_width() {
    assert_eq!(column_letter(1), "A");
    assert_eq!(column_letter(5), "E");
    assert_eq!(column_letter(26), "Z");
    assert_eq!(column_letter(27), "AA");
    assert_eq!(column_letter(52), "AZ");
}

#[test]
fn a1_range_quotes_title_and_spans_rectangle() {
    assert_eq!(a1_range("Sheet1", 2, 100, 1, 6), "'Sheet1'!A2:F100");
    assert_eq!(a1_range("Q1 'plan'", 2, 10, 5, 5), "'Q1 ''plan'''!E2:E10");
}

#[test]
fn flatten_pads_missing_rows_and_columns() {
    let values = vec![
        vec!["a".to_string(), "b".to_string()],
        vec!["c".to_string()],
    ];
    let cells = flatten_rows(values, 4, &range(2, Some(4), 1, 2));

    assert_eq!(cells.len(), 6);
    assert_eq!(cells[0], Cell { row: 2, col: 1, value: "a".into() });
    assert_eq!(cells[1], Cell { row: 2, col: 2, value: "b".into() });
    assert_eq!(cells[2], Cell { row: 3, col: 1, value: "c".into() });
    assert_eq!(cells[3], Cell { row: 3, col: 2, value: String::new() });
    assert_eq!(cells[4], Cell { row: 4, col: 1, value: String::new() });
    assert_eq!(cells[5], Cell { row: 4, col: 2, value: String::new() });
}

#[test]
fn flatten_is_row_major() {
    let values = vec![vec!["r2c1".to_string(), "r2c2".to_string()]];
    let cells = flatten_rows(values, 3, &range(2, Some(3), 1, 2));
    let coords: Vec<(u32, u32)> = cells.iter().map(|c| (c.row, c.col)).collect();
    assert_eq!(coords, vec![(2, 1), (2, 2), (3, 1), (3, 2)]);
}

#[test]
fn flatten_without_include_empty_skips_blanks() {
    let values = vec![vec!["x".to_string()]];
    let mut sparse = range(2, Some(3), 1, 1);
    sparse.include_empty = false;
    let cells = flatten_rows(values, 3, &sparse);
    assert_eq!(cells, vec![Cell { row: 2, col: 1, value: "x".into() }]);
}

#[test]
fn bounding_values_rebuilds_the_rectangle() {
    let cells = vec![
        Cell { row: 2, col: 1, value: "one".into() },
        Cell { row: 2, col: 2, value: String::new() },
        Cell { row: 3, col: 1, value: String::new() },
        Cell { row: 3, col: 2, value: "four".into() },
    ];
    let (a1, values) = bounding_values("Sheet1", &cells).expect("rectangle");
    assert_eq!(a1, "'Sheet1'!A2:B3");
    assert_eq!(values, vec![vec!["one".to_string(), String::new()], vec![
        String::new(),
        "four".to_string()
    ]]);
}

#[test]
fn bounding_values_of_empty_slice_is_none() {
    assert!(bounding_values("Sheet1", &[]).is_none());
}

#[test]
fn document_payload_decodes_grid_properties() {
    let document: DocumentPayload = serde_json::from_value(serde_json::json!({
        "properties": { "title": "Backlog" },
        "sheets": [
            { "properties": { "sheetId": 0, "title": "Sheet1",
                "gridProperties": { "rowCount": 1000, "columnCount": 26 } } },
            { "properties": { "sheetId": 77, "title": "Done" } }
        ]
    }))
    .expect("document");

    assert_eq!(document.properties.title, "Backlog");
    assert_eq!(document.sheets.len(), 2);
    assert_eq!(document.sheets[0].properties.grid_properties.row_count, 1000);
    assert_eq!(document.sheets[1].properties.sheet_id, 77);
    assert_eq!(document.sheets[1].properties.grid_properties.row_count, 0);
}

#[tokio::test]
async fn session_requires_authentication_before_reads() {
    let connector = GoogleSheets::new(
        Client::new(),
        Url::parse(DEFAULT_API_BASE).expect("api base"),
        Url::parse(DEFAULT_TOKEN_URL).expect("token url"),
    );
    let key = SpreadsheetKey::extract("1A2b3C4d5E6f7G8h9I0jKlMnOpQrStUvWxYz").expect("key");
    let session = connector.open(&key).await.expect("session");

    let worksheet = WorksheetRef {
        sheet_id: 0,
        title: "Sheet1".into(),
        row_count: 100,
        col_count: 26,
    };
    let err = session
        .get_cells(&worksheet, &range(2, None, 1, 6))
        .await
        .expect_err("should fail");
    assert!(matches!(err, SheetsError::NotAuthenticated));
}
