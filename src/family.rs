//! PDK families and library selection.
//!
//! The registry is built once at start-up ([`FamilyRegistry::builtin`]) and
//! handed by reference to whatever needs it.

use anyhow::{Result, bail};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::PdkError;

/// Sentinel that expands to every library of a family.
pub const ALL_LIBRARIES: &str = "all";
/// Sentinel that expands to a family's default subset.
pub const DEFAULT_LIBRARIES: &str = "default";

/// Upstream source repository a family is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRepo {
    pub owner: String,
    pub name: String,
    pub default_branch: String,
}

impl SourceRepo {
    pub fn new(owner: &str, name: &str, default_branch: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            default_branch: default_branch.to_string(),
        }
    }

    pub fn https_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for SourceRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Family {
    name: String,
    variants: Vec<String>,
    all_libraries: Vec<String>,
    default_includes: Vec<String>,
    source: SourceRepo,
}

impl Family {
    /// Builds a family, checking that it has at least one variant and that
    /// the default library subset is drawn from the full library set.
    ///
    /// `default_includes` falls back to every library.
    pub fn new(
        name: &str,
        variants: &[&str],
        all_libraries: &[&str],
        default_includes: Option<&[&str]>,
        source: SourceRepo,
    ) -> Result<Self> {
        if variants.is_empty() {
            bail!("PDK family {} must have at least one variant", name);
        }

        let default_includes = default_includes.unwrap_or(all_libraries);
        if let Some(stray) = default_includes
            .iter()
            .find(|lib| !all_libraries.contains(lib))
        {
            bail!(
                "Default library {} is not a library of PDK family {}",
                stray,
                name
            );
        }

        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Ok(Self {
            name: name.to_string(),
            variants: owned(variants),
            all_libraries: owned(all_libraries),
            default_includes: owned(default_includes),
            source,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variants(&self) -> &[String] {
        &self.variants
    }

    pub fn all_libraries(&self) -> &[String] {
        &self.all_libraries
    }

    pub fn default_includes(&self) -> &[String] {
        &self.default_includes
    }

    pub fn source(&self) -> &SourceRepo {
        &self.source
    }

    /// Resolves a caller-supplied library list into a set.
    ///
    /// `None` means `["default"]`. `"all"` (any case) short-circuits to the
    /// full library set, `"default"` adds the default subset, anything else
    /// must name a library of this family.
    pub fn resolve_libraries<S: AsRef<str>>(&self, input: Option<&[S]>) -> Result<BTreeSet<String>> {
        let Some(input) = input else {
            return Ok(self.default_includes.iter().cloned().collect());
        };

        if input
            .iter()
            .any(|element| element.as_ref().eq_ignore_ascii_case(ALL_LIBRARIES))
        {
            return Ok(self.all_libraries.iter().cloned().collect());
        }

        let mut resolved = BTreeSet::new();
        for element in input {
            let element = element.as_ref();
            if element.eq_ignore_ascii_case(DEFAULT_LIBRARIES) {
                resolved.extend(self.default_includes.iter().cloned());
            } else if self.all_libraries.iter().any(|lib| lib == element) {
                resolved.insert(element.to_string());
            } else {
                return Err(PdkError::UnknownLibrary {
                    family: self.name.clone(),
                    library: element.to_string(),
                }
                .into());
            }
        }
        Ok(resolved)
    }
}

/// Immutable table of the PDK families this tool knows about.
#[derive(Debug, Clone, Default)]
pub struct FamilyRegistry {
    families: BTreeMap<String, Family>,
}

impl FamilyRegistry {
    pub fn new(families: impl IntoIterator<Item = Family>) -> Self {
        Self {
            families: families
                .into_iter()
                .map(|f| (f.name.clone(), f))
                .collect(),
        }
    }

    /// The families published by the release repository.
    pub fn builtin() -> Result<Self> {
        let open_pdks = SourceRepo::new("RTimothyEdwards", "open_pdks", "master");
        let ihp = SourceRepo::new("IHP-GmbH", "IHP-Open-PDK", "main");

        Ok(Self::new([
            Family::new(
                "sky130",
                &["sky130A", "sky130B"],
                &[
                    "sky130_fd_io",
                    "sky130_fd_pr",
                    "sky130_ml_xx_hd",
                    "sky130_fd_sc_hd",
                    "sky130_fd_sc_hdll",
                    "sky130_fd_sc_lp",
                    "sky130_fd_sc_hvl",
                    "sky130_fd_sc_ls",
                    "sky130_fd_sc_ms",
                    "sky130_fd_sc_hs",
                    "sky130_sram_macros",
                    "sky130_fd_pr_reram",
                ],
                Some(&[
                    "sky130_fd_io",
                    "sky130_fd_pr",
                    "sky130_fd_sc_hd",
                    "sky130_fd_sc_hvl",
                    "sky130_ml_xx_hd",
                    "sky130_sram_macros",
                ]),
                open_pdks.clone(),
            )?,
            Family::new(
                "gf180mcu",
                &["gf180mcuA", "gf180mcuB", "gf180mcuC", "gf180mcuD"],
                &[
                    "gf180mcu_fd_io",
                    "gf180mcu_fd_pr",
                    "gf180mcu_fd_sc_mcu7t5v0",
                    "gf180mcu_fd_sc_mcu9t5v0",
                    "gf180mcu_fd_ip_sram",
                    "gf180mcu_osu_sc_gp12t3v3",
                    "gf180mcu_osu_sc_gp9t3v3",
                ],
                Some(&[
                    "gf180mcu_fd_io",
                    "gf180mcu_fd_pr",
                    "gf180mcu_fd_sc_mcu7t5v0",
                    "gf180mcu_fd_sc_mcu9t5v0",
                    "gf180mcu_fd_ip_sram",
                ]),
                open_pdks,
            )?,
            Family::new(
                "ihp-sg13g2",
                &["ihp-sg13g2"],
                &["sg13g2_io", "sg13g2_pr", "sg13g2_sram", "sg13g2_stdcell"],
                None,
                ihp,
            )?,
        ]))
    }

    pub fn get(&self, name: &str) -> Result<&Family> {
        self.families
            .get(name)
            .ok_or_else(|| PdkError::UnknownFamily(name.to_string()).into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.families.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.families.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Family> {
        self.families.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> FamilyRegistry {
        FamilyRegistry::builtin().unwrap()
    }

    #[test]
    fn test_builtin_families_hold_their_invariants() {
        let registry = registry();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["gf180mcu", "ihp-sg13g2", "sky130"]
        );
        for family in registry.iter() {
            assert!(!family.variants().is_empty());
            for lib in family.default_includes() {
                assert!(family.all_libraries().contains(lib), "{} not in {}", lib, family.name());
            }
        }
    }

    #[test]
    fn test_ihp_defaults_fall_back() {
        let registry = registry();
        let ihp = registry.get("ihp-sg13g2").unwrap();
        assert_eq!(ihp.variants(), ["ihp-sg13g2"]);
        assert_eq!(ihp.default_includes(), ihp.all_libraries());
    }

    #[test]
    fn test_unknown_family() {
        let err = registry().get("tsmc7").unwrap_err();
        assert!(matches!(
            PdkError::kind_of(&err),
            Some(PdkError::UnknownFamily(name)) if name == "tsmc7"
        ));
    }

    #[test]
    fn test_family_rejects_empty_variants() {
        let source = SourceRepo::new("o", "r", "main");
        assert!(Family::new("x", &[], &["a"], None, source).is_err());
    }

    #[test]
    fn test_family_rejects_stray_default_library() {
        let source = SourceRepo::new("o", "r", "main");
        let result = Family::new("x", &["xA"], &["a", "b"], Some(&["a", "c"]), source);
        assert!(result.unwrap_err().to_string().contains("Default library c"));
    }

    #[test]
    fn test_resolve_none_equals_default() {
        for family in registry().iter() {
            let from_none = family.resolve_libraries::<&str>(None).unwrap();
            let from_default = family.resolve_libraries(Some(&["default"])).unwrap();
            let expected: BTreeSet<String> = family.default_includes().iter().cloned().collect();
            assert_eq!(from_none, expected);
            assert_eq!(from_default, expected);
        }
    }

    #[test]
    fn test_resolve_all_short_circuits() {
        let registry = registry();
        let sky130 = registry.get("sky130").unwrap();
        let expected: BTreeSet<String> = sky130.all_libraries().iter().cloned().collect();

        // Unknown names anywhere in the input are never looked at
        let resolved = sky130
            .resolve_libraries(Some(&["not_a_library", "sky130_fd_sc_hd", "ALL"]))
            .unwrap();
        assert_eq!(resolved, expected);
    }

    #[test]
    fn test_resolve_is_a_set_union() {
        let registry = registry();
        let sky130 = registry.get("sky130").unwrap();

        let a = sky130
            .resolve_libraries(Some(&["sky130_fd_sc_ms", "default", "sky130_fd_sc_ms"]))
            .unwrap();
        let b = sky130
            .resolve_libraries(Some(&["default", "sky130_fd_sc_ms"]))
            .unwrap();
        assert_eq!(a, b);
        assert!(a.contains("sky130_fd_sc_ms"));
        assert!(a.contains("sky130_fd_sc_hd"));
        assert_eq!(a.len(), sky130.default_includes().len() + 1);
    }

    #[test]
    fn test_resolve_unknown_library() {
        let registry = registry();
        let gf180 = registry.get("gf180mcu").unwrap();
        let err = gf180
            .resolve_libraries(Some(&["sky130_fd_sc_hd"]))
            .unwrap_err();
        assert!(matches!(
            PdkError::kind_of(&err),
            Some(PdkError::UnknownLibrary { library, .. }) if library == "sky130_fd_sc_hd"
        ));
    }

    #[test]
    fn test_resolve_empty_configured_default() {
        let source = SourceRepo::new("o", "r", "main");
        let family = Family::new("x", &["xA"], &["a"], Some(&[]), source).unwrap();
        assert!(family.resolve_libraries(Some(&["default"])).unwrap().is_empty());
        assert!(family.resolve_libraries::<&str>(Some(&[])).unwrap().is_empty());
    }

    #[test]
    fn test_source_repo_url() {
        let repo = SourceRepo::new("RTimothyEdwards", "open_pdks", "master");
        assert_eq!(repo.https_url(), "https://github.com/RTimothyEdwards/open_pdks");
        assert_eq!(repo.to_string(), "RTimothyEdwards/open_pdks");
    }
}
