//! A category is what differential dataflow sees of an instance: the
//! qualified label of the tree (or projection) that produced it, and
//! the instance's path.  Two instances with the same path are the
//! same category, whatever their monitors or warnings.
use serde::{Deserialize, Serialize};
use std::io::Result as IOResult;
use std::io::Write;
use tsc_engine::Instance;

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Category {
    pub tree: String,
    pub paths: Vec<String>,
}

impl Category {
    #[inline]
    pub fn new(tree: &str, paths: Vec<String>) -> Self {
        Self {
            tree: tree.into(),
            paths,
        }
    }

    #[inline]
    pub fn from_instance(tree: &str, instance: &Instance) -> Self {
        Self::new(tree, instance.path())
    }
}

/// Abomonated data must stay aligned: `paths`' array of `String`
/// headers goes right after the `Category` itself, and the byte-only
/// contents of `tree` last.
impl abomonation::Abomonation for Category {
    unsafe fn entomb<W: Write>(&self, write: &mut W) -> IOResult<()> {
        self.paths.entomb(write)?;
        self.tree.entomb(write)
    }

    unsafe fn exhume<'a, 'b>(&'a mut self, bytes: &'b mut [u8]) -> Option<&'b mut [u8]> {
        let rest = self.paths.exhume(bytes)?;
        self.tree.exhume(rest)
    }

    fn extent(&self) -> usize {
        self.paths.extent() + self.tree.extent()
    }
}

#[test]
fn test_from_instance() {
    use tsc_engine::InstanceNode;

    let instance = Instance {
        root: InstanceNode::new(
            "Root",
            vec![InstanceNode::new("Weather", vec![InstanceNode::leaf("Rain")])],
        ),
        monitors: Vec::new(),
        warnings: Vec::new(),
    };

    assert_eq!(
        Category::from_instance("weather", &instance),
        Category::new("weather", vec!["Root".into(), "Weather/Rain".into()])
    );
}

#[test]
fn test_abomonation_round_trip() {
    let category = Category::new("weather[static]", vec!["Root".into(), "Weather".into()]);

    let mut bytes = Vec::new();
    unsafe {
        abomonation::encode(&category, &mut bytes).expect("ok");
    }
    assert_eq!(bytes.len(), abomonation::measure(&category));

    let (decoded, rest) = unsafe { abomonation::decode::<Category>(&mut bytes) }.expect("ok");
    assert_eq!(decoded, &category);
    assert!(rest.is_empty());
}

#[test]
fn test_abomonation_odd_lengths() {
    // Labels of every length mod 8, so that no field happens to end
    // on an aligned offset.
    for n in 1..=9 {
        let category = Category::new(
            &"t".repeat(n),
            (0..n).map(|i| "p".repeat(2 * i + 1)).collect(),
        );

        let mut bytes = Vec::new();
        unsafe {
            abomonation::encode(&category, &mut bytes).expect("ok");
        }
        assert_eq!(bytes.len(), abomonation::measure(&category));

        let (decoded, rest) = unsafe { abomonation::decode::<Category>(&mut bytes) }.expect("ok");
        assert_eq!(decoded, &category);
        assert!(rest.is_empty());
    }
}
