//! T-SQL command text issued against the LocalDB instance.

use crate::paths::TEMPLATE_NAME;
use std::path::Path;

/// Take every non-system database offline so its files can be replaced.
pub const TAKE_DBS_OFFLINE: &str = "
declare @command nvarchar(max)
set @command = ''

select @command = @command
+ '
begin try
  alter database [' + replace([name], ']', ']]') + '] set offline with rollback immediate;
end try
begin catch
end catch;
'
from [master].[sys].[databases]
where [name] not in ('master', 'model', 'msdb', 'tempdb')
  and [state] = 0

execute sp_executesql @command";

/// Detach the freshly built template, releasing its files.
pub fn detach_template() -> String {
    format!(
        "execute sp_detach_db {}, 'true';",
        quote_literal(TEMPLATE_NAME)
    )
}

/// Grow the `model` database so new databases start at `size_mb`.
pub fn optimize(size_mb: u16) -> String {
    format!(
        "
execute sp_configure 'show advanced options', 1;
reconfigure;
execute sp_configure 'user instance timeout', 30;
reconfigure;
alter database [model] modify file (name = modeldev, size = {size_mb}MB);"
    )
}

/// Drop any leftover template database and create an empty one on the given files.
pub fn create_template(data_file: &Path, log_file: &Path) -> String {
    let name = quote_ident(TEMPLATE_NAME);
    format!(
        "
if db_id({literal}) is not null
begin
  alter database {name} set single_user with rollback immediate;
  drop database {name};
end;

create database {name} on
(
  name = {name},
  filename = {data}
)
log on
(
  name = {log_name},
  filename = {log}
);",
        literal = quote_literal(TEMPLATE_NAME),
        data = quote_literal(&data_file.to_string_lossy()),
        log_name = quote_ident(&format!("{}_log", TEMPLATE_NAME)),
        log = quote_literal(&log_file.to_string_lossy()),
    )
}

/// Attach copied files as database `name`, or bring an existing one back online.
pub fn create_or_make_online(
    name: &str,
    data_file: &Path,
    log_file: &Path,
    with_rollback: bool,
) -> String {
    let ident = quote_ident(name);
    let literal = quote_literal(name);
    let mut command = format!(
        "
if db_id({literal}) is null
begin
  create database {ident} on
  (
    filename = {data}
  ),
  (
    filename = {log}
  )
  for attach;
end
else
begin
  alter database {ident} set online;
end;",
        data = quote_literal(&data_file.to_string_lossy()),
        log = quote_literal(&log_file.to_string_lossy()),
    );
    if with_rollback {
        command.push_str(&format!(
            "
alter database {ident} set allow_snapshot_isolation on;
alter database {ident} set read_committed_snapshot on with rollback immediate;"
        ));
    }
    command
}

/// Kick out open connections and detach database `name`.
pub fn delete_database(name: &str) -> String {
    let ident = quote_ident(name);
    format!(
        "
if db_id({literal}) is not null
begin
  alter database {ident} set single_user with rollback immediate;
  execute sp_detach_db {literal}, 'true';
end;",
        literal = quote_literal(name),
    )
}

/// `[name]` with embedded `]` doubled.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// `N'value'` with embedded `'` doubled.
pub fn quote_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("a]b"), "[a]]b]");
        assert_eq!(quote_literal("o'neil"), "N'o''neil'");
    }

    #[test]
    fn test_attach_command() {
        let data = PathBuf::from("/db/Simple.mdf");
        let log = PathBuf::from("/db/Simple_log.ldf");
        let command = create_or_make_online("Simple", &data, &log, false);
        assert!(command.contains("create database [Simple] on"));
        assert!(command.contains("N'/db/Simple.mdf'"));
        assert!(command.contains("N'/db/Simple_log.ldf'"));
        assert!(command.contains("for attach"));
        assert!(!command.contains("snapshot"));
    }

    #[test]
    fn test_attach_with_rollback_enables_snapshot_isolation() {
        let data = PathBuf::from("/db/withRollback.mdf");
        let log = PathBuf::from("/db/withRollback_log.ldf");
        let command = create_or_make_online("withRollback", &data, &log, true);
        assert!(command.contains("alter database [withRollback] set allow_snapshot_isolation on"));
    }

    #[test]
    fn test_template_commands() {
        let create = create_template(
            &PathBuf::from("/db/template.mdf"),
            &PathBuf::from("/db/template_log.ldf"),
        );
        assert!(create.contains("create database [template] on"));
        assert!(create.contains("name = [template_log]"));
        assert_eq!(detach_template(), "execute sp_detach_db N'template', 'true';");
    }

    #[test]
    fn test_optimize_uses_size() {
        assert!(optimize(10).contains("size = 10MB"));
    }

    #[test]
    fn test_delete_database_escapes_name() {
        let command = delete_database("it's");
        assert!(command.contains("db_id(N'it''s')"));
        assert!(command.contains("alter database [it's] set single_user"));
    }
}
