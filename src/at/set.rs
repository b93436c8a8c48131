use crate::at::codec::AccessTransform;
use crate::at::errors::AtError;
use std::collections::BTreeMap;
use std::fmt;

/// A member of a class targeted by an access transform.
///
/// Variant order is significant: methods sort before fields, which fixes the
/// order of header lines in rebuilt patches.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemberKey {
    Method { name: String, descriptor: String },
    Field(String),
}

impl MemberKey {
    /// Parse a member target: `name(desc)ret` is a method, anything else a field.
    pub fn parse(target: &str) -> Self {
        match target.find('(') {
            Some(idx) => MemberKey::Method {
                name: target[..idx].to_string(),
                descriptor: target[idx..].to_string(),
            },
            None => MemberKey::Field(target.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            MemberKey::Method { name, .. } => name,
            MemberKey::Field(name) => name,
        }
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberKey::Method { name, descriptor } => write!(f, "{name}{descriptor}"),
            MemberKey::Field(name) => f.write_str(name),
        }
    }
}

/// Transforms for one class: the class declaration itself plus its members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassTransforms {
    pub class: AccessTransform,
    pub members: BTreeMap<MemberKey, AccessTransform>,
}

impl ClassTransforms {
    pub fn is_empty(&self) -> bool {
        self.class.is_empty() && self.members.is_empty()
    }

    /// Header/table entries in canonical order: class first, then members.
    pub fn entries(&self) -> impl Iterator<Item = (Option<&MemberKey>, &AccessTransform)> {
        let class = (!self.class.is_empty()).then_some((None, &self.class));
        class
            .into_iter()
            .chain(self.members.iter().map(|(k, v)| (Some(k), v)))
    }
}

/// Fully-qualified class name (dotted, `$` for nested classes) to transforms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessTransformSet {
    classes: BTreeMap<String, ClassTransforms>,
}

impl AccessTransformSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.values().all(ClassTransforms::is_empty)
    }

    /// Total number of class and member entries.
    pub fn len(&self) -> usize {
        self.classes
            .values()
            .map(|c| c.entries().count())
            .sum()
    }

    pub fn get_class(&self, class: &str) -> Option<&ClassTransforms> {
        self.classes.get(class).filter(|c| !c.is_empty())
    }

    pub fn classes(&self) -> impl Iterator<Item = (&str, &ClassTransforms)> {
        self.classes
            .iter()
            .filter(|(_, c)| !c.is_empty())
            .map(|(name, c)| (name.as_str(), c))
    }

    /// Look up the transform for `class` (member `None`) or one of its members.
    pub fn get(&self, class: &str, member: Option<&MemberKey>) -> Option<&AccessTransform> {
        let transforms = self.classes.get(class)?;
        match member {
            None => (!transforms.class.is_empty()).then_some(&transforms.class),
            Some(key) => transforms.members.get(key),
        }
    }

    /// Merge one transform into the set.
    ///
    /// On conflict the existing entry is left untouched.
    pub fn merge(
        &mut self,
        class: &str,
        member: Option<MemberKey>,
        at: AccessTransform,
    ) -> Result<(), AtError> {
        if at.is_empty() {
            return Ok(());
        }
        let transforms = self.classes.entry(class.to_string()).or_default();
        let slot = match &member {
            None => &mut transforms.class,
            Some(key) => transforms.members.entry(key.clone()).or_default(),
        };
        match slot.merge(&at) {
            Some(merged) => {
                *slot = merged;
                Ok(())
            }
            None => Err(AtError::ConflictingTransform {
                class: class.to_string(),
                member: member.map(|m| format!("#{m}")).unwrap_or_default(),
                existing: *slot,
                incoming: at,
            }),
        }
    }

    /// Merge every entry of `other` into `self`, collecting conflicts.
    pub fn merge_set(&mut self, other: &AccessTransformSet) -> Vec<AtError> {
        let mut conflicts = Vec::new();
        for (class, transforms) in other.classes() {
            for (member, at) in transforms.entries() {
                if let Err(e) = self.merge(class, member.cloned(), *at) {
                    conflicts.push(e);
                }
            }
        }
        conflicts
    }

    /// Merge `other` into `self`, letting `other` win on conflict.
    ///
    /// Returns the conflicts that were resolved by replacing the old entry.
    pub fn overlay(&mut self, other: &AccessTransformSet) -> Vec<AtError> {
        let mut replaced = Vec::new();
        for (class, transforms) in other.classes() {
            for (member, at) in transforms.entries() {
                if let Err(conflict) = self.merge(class, member.cloned(), *at) {
                    let slot = self.classes.entry(class.to_string()).or_default();
                    match member {
                        None => slot.class = *at,
                        Some(key) => {
                            slot.members.insert(key.clone(), *at);
                        }
                    }
                    replaced.push(conflict);
                }
            }
        }
        replaced
    }

    /// A set holding only `class`'s transforms from `self`.
    pub fn restrict_to(&self, class: &str) -> AccessTransformSet {
        let mut out = AccessTransformSet::new();
        if let Some(transforms) = self.get_class(class) {
            out.classes.insert(class.to_string(), transforms.clone());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::at::codec::parse;

    #[test]
    fn overlay_prefers_incoming_on_conflict() {
        let mut set = AccessTransformSet::new();
        set.merge("a.A", Some(MemberKey::parse("m()V")), parse("private").unwrap())
            .unwrap();
        set.merge("a.A", Some(MemberKey::parse("x")), parse("protected").unwrap())
            .unwrap();

        let mut newer = AccessTransformSet::new();
        newer
            .merge("a.A", Some(MemberKey::parse("m()V")), parse("public").unwrap())
            .unwrap();
        newer
            .merge("a.A", Some(MemberKey::parse("x")), parse("-f").unwrap())
            .unwrap();

        let replaced = set.overlay(&newer);
        assert_eq!(replaced.len(), 1);
        assert_eq!(
            set.get("a.A", Some(&MemberKey::parse("m()V"))),
            Some(&parse("public").unwrap())
        );
        // compatible entries still merge
        assert_eq!(
            set.get("a.A", Some(&MemberKey::parse("x"))),
            Some(&parse("protected-f").unwrap())
        );
    }

    #[test]
    fn member_key_parsing() {
        assert_eq!(
            MemberKey::parse("m()V"),
            MemberKey::Method {
                name: "m".into(),
                descriptor: "()V".into()
            }
        );
        assert_eq!(MemberKey::parse("count"), MemberKey::Field("count".into()));
        assert_eq!(MemberKey::parse("<init>(I)V").to_string(), "<init>(I)V");
    }

    #[test]
    fn merge_upgrades_and_reports_conflicts() {
        let mut set = AccessTransformSet::new();
        set.merge("a.A", Some(MemberKey::parse("x")), parse("protected").unwrap())
            .unwrap();
        set.merge("a.A", Some(MemberKey::parse("x")), parse("public").unwrap())
            .unwrap();
        assert_eq!(
            set.get("a.A", Some(&MemberKey::parse("x"))),
            Some(&parse("public").unwrap())
        );

        let err = set
            .merge("a.A", Some(MemberKey::parse("x")), parse("private").unwrap())
            .unwrap_err();
        assert!(matches!(err, AtError::ConflictingTransform { ref member, .. } if member == "#x"));
        // untouched after conflict
        assert_eq!(
            set.get("a.A", Some(&MemberKey::parse("x"))),
            Some(&parse("public").unwrap())
        );
    }

    #[test]
    fn entries_put_methods_before_fields() {
        let mut set = AccessTransformSet::new();
        set.merge("a.A", Some(MemberKey::parse("b")), parse("public").unwrap())
            .unwrap();
        set.merge("a.A", Some(MemberKey::parse("a()V")), parse("public").unwrap())
            .unwrap();
        set.merge("a.A", None, parse("public-f").unwrap()).unwrap();

        let rendered: Vec<String> = set
            .get_class("a.A")
            .unwrap()
            .entries()
            .map(|(m, at)| format!("{at} {}", m.map(|m| m.to_string()).unwrap_or_default()))
            .collect();
        assert_eq!(rendered, vec!["public-f ", "public a()V", "public b"]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn merge_set_collects_every_conflict() {
        let mut a = AccessTransformSet::new();
        a.merge("x.X", Some(MemberKey::parse("f")), parse("+f").unwrap())
            .unwrap();
        a.merge("x.X", None, parse("private").unwrap()).unwrap();

        let mut b = AccessTransformSet::new();
        b.merge("x.X", Some(MemberKey::parse("f")), parse("-f").unwrap())
            .unwrap();
        b.merge("x.X", None, parse("public").unwrap()).unwrap();
        b.merge("y.Y", None, parse("public").unwrap()).unwrap();

        let conflicts = a.merge_set(&b);
        assert_eq!(conflicts.len(), 2);
        assert!(a.get_class("y.Y").is_some());
    }

    #[test]
    fn empty_transforms_do_not_create_classes() {
        let mut set = AccessTransformSet::new();
        set.merge("a.A", None, AccessTransform::EMPTY).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.classes().count(), 0);
    }
}
