use tgsql::{ColumnValue, FromRow, Record, Values};

#[derive(Debug, FromRow)]
#[allow(dead_code)]
struct User {
    id: i64,
    name: String,
    #[orm(column = "mail")]
    email: Option<String>,
    #[orm(skip)]
    cached_rank: u32,
}

#[derive(Record)]
#[allow(dead_code)]
struct NewUser {
    name: String,
    #[orm(column = "mail")]
    email: Option<String>,
    age: i32,
    #[orm(skip)]
    password_confirm: String,
}

fn assert_from_row<T: FromRow>() {}

#[test]
fn from_row_is_implemented() {
    assert_from_row::<User>();
}

#[test]
fn record_maps_columns_in_field_order() {
    let values: Values = NewUser {
        name: "alice".to_string(),
        email: None,
        age: 30,
        password_confirm: "secret".to_string(),
    }
    .into_values();

    assert_eq!(values.columns().collect::<Vec<_>>(), vec!["name", "mail", "age"]);
    match values.get("name") {
        Some(ColumnValue::Bind(p)) => assert_eq!(p.literal(), "'alice'"),
        other => panic!("unexpected value: {other:?}"),
    }
    match values.get("mail") {
        Some(ColumnValue::Bind(p)) => assert_eq!(p.literal(), "NULL"),
        other => panic!("unexpected value: {other:?}"),
    }
}
