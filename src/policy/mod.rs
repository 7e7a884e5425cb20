//! The Policy Resolver (§4.D): computes the effective policy for
//! (session, toolName) by deterministically merging project and session
//! configuration.

use crate::model::{Policy, Project, Session};

/// Computes the effective policy for a (session, tool) pair. Stateless —
/// every call is a pure function of the project and session it is given.
pub struct PolicyResolver;

impl PolicyResolver {
    /// Resolve the policy for `tool_name` against `session`'s and its
    /// owning `project`'s configuration (§4.D algorithm):
    ///
    /// 1. Bridged tools (`serverId/name`) are looked up by both the full
    ///    name and the bare name; the full name wins.
    /// 2. Session `toolPolicies` overlay project `toolPolicies`, key-wise.
    /// 3. An allowlist at either level that omits the tool forces `deny`.
    /// 4. Otherwise `require-approval` is the default.
    pub fn resolve(project: &Project, session: &Session, tool_name: &str) -> Policy {
        let bare_name = tool_name.rsplit_once('/').map(|(_, name)| name);

        let project_tools = &project.configuration;
        let session_tools = &session.configuration.tools;

        if let Some(allowlist) = session_tools.allowlist.as_ref().or(project_tools.allowlist.as_ref()) {
            let allowed = allowlist.iter().any(|name| name == tool_name)
                || bare_name.is_some_and(|bare| allowlist.iter().any(|name| name == bare));
            if !allowed {
                return Policy::Deny;
            }
        }

        let lookup = |policies: &std::collections::HashMap<String, Policy>| -> Option<Policy> {
            policies
                .get(tool_name)
                .copied()
                .or_else(|| bare_name.and_then(|bare| policies.get(bare).copied()))
        };

        lookup(&session_tools.tool_policies)
            .or_else(|| lookup(&project_tools.tool_policies))
            .unwrap_or(Policy::RequireApproval)
    }
}
