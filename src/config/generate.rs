pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# TGTAG CONFIGURATION
# =============================================================================
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/tgtag/config.yml
#   3. /etc/tgtag/config.yml
#
# Paths may use ~ and $env{VAR} expansion.

system:
  # Directory holding Telegram Desktop "Export chat history" folders.
  # Every matching file below it is parsed on each `tgtag save`.
  data_path: ~/tg-exports
  # File extensions to pick up. An empty list picks up every file.
  extensions: [html]

store:
  # DuckDB database file. Created on first run.
  path: ~/.local/share/tgtag/messages.duckdb

pipeline:
  # Bounded hand-off between file discovery and parsing.
  filenames_buffer: 2
  # Bounded hand-off between parsing and the batch writer.
  messages_buffer: 10

writer:
  # Flush as soon as this many messages are buffered...
  batch_size: 10
  # ...or on this period, whichever comes first.
  flush_period: 2s
  # Messages the writer queue holds before callers wait.
  queue_capacity: 50

server:
  listen: 127.0.0.1:8080
"#
    .to_string()
}
