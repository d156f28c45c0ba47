use std::collections::BTreeSet;

use log::{debug, warn};

use crate::annotation::parse_annotations;
use crate::classfile::{ConstantPool, Member, ParsedClass};
use crate::descriptor::{descriptor_types, element_class, package_of, top_level_class};
use crate::error::{AnalysisError, Result};
use crate::filter::PackageAcceptor;
use crate::signature::{class_signature_types, field_signature_types, method_signature_types};

/// Everything one class contributes to the dependency graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassImports {
    /// Fully qualified dotted name.
    pub class_name: String,
    pub package: String,
    pub source_file: Option<String>,
    /// Accepted packages this class refers to, its own package excluded.
    pub imports: BTreeSet<String>,
    /// Outermost classes this class refers to by name, itself excluded.
    pub referenced_classes: BTreeSet<String>,
    /// Signature attributes that failed to parse and contributed nothing.
    pub warnings: Vec<AnalysisError>,
}

/// Compute the package imports of one parsed class.
///
/// Invalid signature attributes are recorded as warnings. Malformed or
/// unsupported annotation data fails the whole class.
pub fn extract_imports(
    class: &ParsedClass,
    acceptor: &dyn PackageAcceptor,
) -> Result<ClassImports> {
    let class_name = class.dotted_name();
    let package = package_of(&class.name).ok_or_else(|| {
        AnalysisError::malformed(format!("class name `{}` has no package", class.name))
    })?;
    let own_class = top_level_class(&class.name).unwrap_or_else(|| class_name.clone());
    let mut collector = ImportCollector {
        package,
        own_class,
        acceptor,
        imports: BTreeSet::new(),
        referenced_classes: BTreeSet::new(),
        warnings: Vec::new(),
    };

    if let Some(super_name) = &class.super_name {
        collector.add_class(super_name);
    }
    for interface in &class.interfaces {
        collector.add_class(interface);
    }
    for name in class.constant_pool.class_names()? {
        collector.add_class(name);
    }

    for member in class.fields.iter().chain(&class.methods) {
        for name in descriptor_types(&member.descriptor) {
            collector.add_class(name);
        }
    }

    if let Some(signature) = &class.signature {
        collector.add_signature(class_signature_types(signature));
    }
    for field in &class.fields {
        if let Some(signature) = &field.signature {
            collector.add_signature(field_signature_types(signature));
        }
    }
    for method in &class.methods {
        if let Some(signature) = &method.signature {
            collector.add_signature(method_signature_types(signature));
        }
    }

    if let Some(data) = &class.annotations {
        collector.add_annotations(data, &class.constant_pool)?;
    }
    // Every member counts, the first one included.
    for member in class.fields.iter().chain(&class.methods) {
        collector.add_member_annotations(member, &class.constant_pool)?;
    }

    debug!(
        "{}: {} imported packages, {} referenced classes",
        class_name,
        collector.imports.len(),
        collector.referenced_classes.len()
    );
    Ok(ClassImports {
        class_name,
        package: collector.package,
        source_file: class.source_file.clone(),
        imports: collector.imports,
        referenced_classes: collector.referenced_classes,
        warnings: collector.warnings,
    })
}

struct ImportCollector<'a> {
    package: String,
    own_class: String,
    acceptor: &'a dyn PackageAcceptor,
    imports: BTreeSet<String>,
    referenced_classes: BTreeSet<String>,
    warnings: Vec<AnalysisError>,
}

impl ImportCollector<'_> {
    fn add_package(&mut self, package: String) -> bool {
        if package == self.package || !self.acceptor.accept(&package) {
            return false;
        }
        self.imports.insert(package);
        true
    }

    fn add_class(&mut self, name: &str) {
        let Some(class) = element_class(name) else {
            return;
        };
        let Some(package) = package_of(class) else {
            return;
        };
        let same_package = package == self.package;
        if !same_package && !self.add_package(package) {
            return;
        }
        if let Some(top_level) = top_level_class(class) {
            if top_level != self.own_class {
                self.referenced_classes.insert(top_level);
            }
        }
    }

    fn add_signature(&mut self, classes: Result<Vec<String>>) {
        match classes {
            Ok(classes) => {
                for name in classes {
                    self.add_class(&name);
                }
            }
            Err(err) => {
                warn!("ignoring signature: {err}");
                self.warnings.push(err);
            }
        }
    }

    fn add_member_annotations(&mut self, member: &Member, pool: &ConstantPool) -> Result<()> {
        match &member.annotations {
            Some(data) => self.add_annotations(data, pool),
            None => Ok(()),
        }
    }

    fn add_annotations(&mut self, data: &[u8], pool: &ConstantPool) -> Result<()> {
        for annotation in parse_annotations(data, pool)? {
            for descriptor in annotation.referenced_descriptors() {
                for name in descriptor_types(descriptor) {
                    self.add_class(name);
                }
            }
        }
        Ok(())
    }
}
