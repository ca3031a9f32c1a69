#![forbid(unsafe_code)]

mod audit_groups;
mod audit_log;
mod indexes;
mod meta;
mod nodes;

pub(super) fn table_schema_sql() -> String {
    let mut sql = String::new();
    sql.push_str(meta::SQL);
    sql.push_str(nodes::SQL);
    sql.push_str(audit_log::SQL);
    sql.push_str(audit_groups::SQL);
    sql
}

pub(super) fn derived_schema_sql() -> String {
    let mut sql = String::new();
    sql.push_str(audit_log::TRIGGERS);
    sql.push_str(indexes::SQL);
    sql
}
