// Shared prompt fragments. Each module that calls the generator keeps its own
// prompts.rs alongside it; only cross-cutting rules live here.

/// Forbids the model from narrating the source ("This paper discusses...").
pub const DIRECT_VOICE_INSTRUCTION: &str = "\
CRITICAL RULES - YOU MUST FOLLOW THESE:
- NEVER start sentences with: \"This paper\", \"This document\", \"This case study\", \"This content\", \"The author\", \"The research\"
- NEVER use phrases like: \"discusses\", \"presents\", \"explores\", \"examines\" when referring to the document
- Write DIRECTLY about the subject matter itself
- Act as if YOU are teaching the topic, not describing someone else's work

WRONG (DO NOT DO THIS):
\"This case study presents the Software as a Service lifecycle...\"
\"The paper discusses cloud computing concepts...\"

CORRECT (DO THIS):
\"The Software as a Service (SaaS) lifecycle encompasses multiple phases...\"
\"Cloud computing relies on distributed infrastructure...\"";
