use crate::numfmt::{format_general, format_shortest};
use indexmap::IndexMap;
use itertools::{iproduct, Itertools};
use serde::Serialize;
use std::{fmt, io::Write, str::FromStr};
use thiserror::Error;
use tracing::debug;

/// value of the gaussian kernel at the edge of its coverage
pub const GAUSSIAN_DECAY: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum CaseError {
    #[error("Argument {value} is not one of the following valid options: {options}")]
    InvalidOption { value: String, options: String },
    #[error("Case {0} is generated twice, check for repeated list entries")]
    DuplicateCase(String),
    #[error("At least one {0} is required")]
    Empty(&'static str),
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: String },
    #[error("Failed to serialize the configuration")]
    Serialize(#[from] serde_json::Error),
    #[error("Failed to write the configuration")]
    Io(#[from] std::io::Error),
}

fn invalid<T: fmt::Display>(value: &str, options: &[T]) -> CaseError {
    CaseError::InvalidOption {
        value: value.to_string(),
        options: options.iter().join(", "),
    }
}

/// How the polynomial part of the interpolant is treated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Polynomial {
    On,
    Separate,
    Off,
}

impl Polynomial {
    pub const ALL: [Polynomial; 3] = [Self::On, Self::Separate, Self::Off];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Separate => "separate",
            Self::Off => "off",
        }
    }
}

impl fmt::Display for Polynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Polynomial {
    type Err = CaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|polynomial| polynomial.as_str() == s)
            .ok_or_else(|| invalid(s, &Self::ALL))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BasisFunction {
    Multiquadrics,
    InverseMultiquadrics,
    VolumeSplines,
    Gaussian,
    CompactTpsC2,
    CompactPolynomialC0,
    CompactPolynomialC2,
    CompactPolynomialC4,
    CompactPolynomialC6,
    CompactPolynomialC8,
}

/// Parameterization of a basis function, written as an xml attribute
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BasisFunctionOptions {
    ShapeParameter(f64),
    SupportRadius(f64),
}

impl fmt::Display for BasisFunctionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeParameter(shape) => {
                write!(f, "shape-parameter=\"{}\"", format_shortest(*shape))
            }
            Self::SupportRadius(radius) => {
                write!(f, "support-radius=\"{}\"", format_shortest(*radius))
            }
        }
    }
}

impl BasisFunction {
    pub const ALL: [BasisFunction; 10] = [
        Self::Multiquadrics,
        Self::InverseMultiquadrics,
        Self::VolumeSplines,
        Self::Gaussian,
        Self::CompactTpsC2,
        Self::CompactPolynomialC0,
        Self::CompactPolynomialC2,
        Self::CompactPolynomialC4,
        Self::CompactPolynomialC6,
        Self::CompactPolynomialC8,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Multiquadrics => "multiquadrics",
            Self::InverseMultiquadrics => "inverse-multiquadrics",
            Self::VolumeSplines => "volume-splines",
            Self::Gaussian => "gaussian",
            Self::CompactTpsC2 => "compact-tps-c2",
            Self::CompactPolynomialC0 => "compact-polynomial-c0",
            Self::CompactPolynomialC2 => "compact-polynomial-c2",
            Self::CompactPolynomialC4 => "compact-polynomial-c4",
            Self::CompactPolynomialC6 => "compact-polynomial-c6",
            Self::CompactPolynomialC8 => "compact-polynomial-c8",
        }
    }

    /// options so that the kernel spans `coverage` vertices of a mesh with edge length `edge_length`
    pub fn options(&self, edge_length: f64, coverage: u32) -> BasisFunctionOptions {
        let support = edge_length * f64::from(coverage);
        match self {
            Self::Gaussian => {
                BasisFunctionOptions::ShapeParameter((-GAUSSIAN_DECAY.ln()).sqrt() / support)
            }
            _ => BasisFunctionOptions::SupportRadius(support),
        }
    }
}

impl fmt::Display for BasisFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BasisFunction {
    type Err = CaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|function| function.as_str() == s)
            .ok_or_else(|| invalid(s, &Self::ALL))
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Case {
    pub kind: String,
    pub options: String,
    #[serde(rename = "basis-function")]
    pub basis_function: String,
    #[serde(rename = "basis-function-options")]
    pub basis_function_options: String,
}

#[derive(Serialize, Clone, Debug)]
pub struct Mapping {
    pub constraints: Vec<String>,
    pub cases: IndexMap<String, Case>,
}

#[derive(Serialize, Clone, Debug)]
pub struct Meshes {
    #[serde(rename = "A")]
    pub a: Vec<String>,
    #[serde(rename = "B")]
    pub b: Vec<String>,
}

/// One input mesh together with all cases mapping from it
#[derive(Serialize, Clone, Debug)]
pub struct Section {
    pub mapping: Mapping,
    pub meshes: Meshes,
}

/// The axes of a test matrix of RBF mappings
#[derive(Clone, Debug)]
pub struct CaseMatrix {
    pub a_meshes: Vec<f64>,
    pub b_meshes: Vec<f64>,
    pub polynomials: Vec<Polynomial>,
    pub kind: String,
    pub basis_functions: Vec<BasisFunction>,
    pub coverage: Vec<u32>,
    pub solver_rtol: f64,
}

impl CaseMatrix {
    fn check(&self) -> Result<(), CaseError> {
        if self.a_meshes.is_empty() {
            Err(CaseError::Empty("A mesh"))
        } else if self.b_meshes.is_empty() {
            Err(CaseError::Empty("B mesh"))
        } else if self.polynomials.is_empty() {
            Err(CaseError::Empty("polynomial"))
        } else if self.basis_functions.is_empty() {
            Err(CaseError::Empty("basis function"))
        } else if self.coverage.is_empty() {
            Err(CaseError::Empty("coverage"))
        } else if let Some(h) = self
            .a_meshes
            .iter()
            .chain(self.b_meshes.iter())
            .find(|h| !(**h > 0.0 && h.is_finite()))
        {
            Err(CaseError::NotPositive {
                name: "mesh size",
                value: h.to_string(),
            })
        } else if self.coverage.contains(&0) {
            Err(CaseError::NotPositive {
                name: "coverage",
                value: "0".to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// Sections are grouped by A mesh, since the kernel size depends on the edge length of the
    /// input mesh.
    pub fn sections(&self) -> Result<Vec<Section>, CaseError> {
        self.check()?;

        let b_meshes = self.b_meshes.iter().copied().map(format_general).collect_vec();

        self.a_meshes
            .iter()
            .map(|&edge_length| {
                let mut cases = IndexMap::new();

                for (polynomial, coverage, function) in
                    iproduct!(&self.polynomials, &self.coverage, &self.basis_functions)
                {
                    let name = format!("{}-{function}-n{coverage}-{polynomial}", self.kind);
                    let case = Case {
                        kind: self.kind.clone(),
                        options: format!(
                            "polynomial=\"{polynomial}\" solver-rtol=\"{}\"",
                            format_shortest(self.solver_rtol)
                        ),
                        basis_function: function.to_string(),
                        basis_function_options: function
                            .options(edge_length, *coverage)
                            .to_string(),
                    };

                    if cases.insert(name.clone(), case).is_some() {
                        return Err(CaseError::DuplicateCase(name));
                    }
                }

                debug!(
                    "Generated {} cases for mesh {}",
                    cases.len(),
                    format_general(edge_length)
                );

                Ok(Section {
                    mapping: Mapping {
                        constraints: vec!["consistent".to_string()],
                        cases,
                    },
                    meshes: Meshes {
                        a: vec![format_general(edge_length)],
                        b: b_meshes.clone(),
                    },
                })
            })
            .collect()
    }

    pub fn write_json<W: Write>(&self, mut writer: W) -> Result<(), CaseError> {
        let sections = self.sections()?;
        serde_json::to_writer_pretty(&mut writer, &sections)?;
        writeln!(writer)?;
        writer.flush()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{BasisFunction, BasisFunctionOptions, CaseError, CaseMatrix, Polynomial};
    use serde_json::{json, Value};

    fn matrix() -> CaseMatrix {
        CaseMatrix {
            a_meshes: vec![0.1],
            b_meshes: vec![0.05],
            polynomials: vec![Polynomial::On],
            kind: "rbf-global-iterative".into(),
            basis_functions: vec![BasisFunction::Gaussian],
            coverage: vec![5],
            solver_rtol: 1e-9,
        }
    }

    #[test]
    fn rejects_unknown_values() {
        assert_eq!("separate".parse::<Polynomial>().unwrap(), Polynomial::Separate);
        assert_eq!(
            " compact-polynomial-c6".parse::<BasisFunction>().unwrap(),
            BasisFunction::CompactPolynomialC6
        );

        match "sometimes".parse::<Polynomial>() {
            Err(CaseError::InvalidOption { value, options }) => {
                assert_eq!(value, "sometimes");
                assert_eq!(options, "on, separate, off");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            "thin-plate-splines".parse::<BasisFunction>(),
            Err(CaseError::InvalidOption { .. })
        ));
    }

    #[test]
    fn gaussian_shape_parameter() {
        let h = 0.02;
        let n = 7;
        match BasisFunction::Gaussian.options(h, n) {
            BasisFunctionOptions::ShapeParameter(shape) => {
                let expected = (-(1e-9f64).ln()).sqrt() / (h * n as f64);
                assert!((shape - expected).abs() < 1e-12);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn compact_support_radius() {
        for function in BasisFunction::ALL
            .into_iter()
            .filter(|function| *function != BasisFunction::Gaussian)
        {
            assert_eq!(
                function.options(0.25, 4),
                BasisFunctionOptions::SupportRadius(1.0)
            );
        }
        assert_eq!(
            BasisFunctionOptions::SupportRadius(0.1 * 3.0).to_string(),
            "support-radius=\"0.30000000000000004\""
        );
    }

    #[test]
    fn single_gaussian_case() {
        let mut buffer = Vec::new();
        matrix().write_json(&mut buffer).unwrap();
        let document: Value = serde_json::from_slice(&buffer).unwrap();

        let sections = document.as_array().unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0]["meshes"], json!({"A": ["0.1"], "B": ["0.05"]}));
        assert_eq!(sections[0]["mapping"]["constraints"], json!(["consistent"]));

        let cases = sections[0]["mapping"]["cases"].as_object().unwrap();
        assert_eq!(cases.len(), 1);
        let case = &cases["rbf-global-iterative-gaussian-n5-on"];
        assert_eq!(case["kind"], "rbf-global-iterative");
        assert_eq!(case["basis-function"], "gaussian");
        assert_eq!(case["options"], "polynomial=\"on\" solver-rtol=\"1e-09\"");

        let options = case["basis-function-options"].as_str().unwrap();
        let shape: f64 = options
            .strip_prefix("shape-parameter=\"")
            .and_then(|rest| rest.strip_suffix('"'))
            .unwrap()
            .parse()
            .unwrap();
        assert!((shape - 9.1043).abs() < 1e-3);
    }

    #[test]
    fn full_product_per_section() {
        let matrix = CaseMatrix {
            a_meshes: vec![0.1, 0.01, 0.001],
            b_meshes: vec![0.05, 0.005],
            polynomials: vec![Polynomial::On, Polynomial::Separate],
            basis_functions: vec![
                BasisFunction::Gaussian,
                BasisFunction::CompactPolynomialC2,
                BasisFunction::VolumeSplines,
            ],
            coverage: vec![3, 5, 10, 15],
            ..matrix()
        };
        let sections = matrix.sections().unwrap();

        assert_eq!(sections.len(), 3);
        for section in sections.iter() {
            assert_eq!(section.mapping.cases.len(), 2 * 4 * 3);
            assert_eq!(section.meshes.b, vec!["0.05", "0.005"]);
        }
        assert_eq!(sections[2].meshes.a, vec!["0.001"]);

        // product order: polynomial, coverage, basis function
        let names: Vec<_> = sections[0].mapping.cases.keys().take(4).collect();
        assert_eq!(
            names,
            vec![
                "rbf-global-iterative-gaussian-n3-on",
                "rbf-global-iterative-compact-polynomial-c2-n3-on",
                "rbf-global-iterative-volume-splines-n3-on",
                "rbf-global-iterative-gaussian-n5-on",
            ]
        );
    }

    #[test]
    fn degenerate_kernels_are_rejected() {
        for matrix in [
            CaseMatrix {
                coverage: vec![5, 0],
                ..matrix()
            },
            CaseMatrix {
                a_meshes: vec![0.1, 0.0],
                ..matrix()
            },
            CaseMatrix {
                b_meshes: vec![-0.05],
                ..matrix()
            },
        ] {
            assert!(matches!(
                matrix.write_json(Vec::new()),
                Err(CaseError::NotPositive { .. })
            ));
        }
    }

    #[test]
    fn repeated_entries_collide() {
        let matrix = CaseMatrix {
            coverage: vec![5, 5],
            ..matrix()
        };

        assert!(matches!(
            matrix.sections(),
            Err(CaseError::DuplicateCase(name)) if name == "rbf-global-iterative-gaussian-n5-on"
        ));
    }
}
