//! Cross-command scenarios over in-memory stores. Per-module behavior is
//! covered next to each module; these exercise whole workflows.
