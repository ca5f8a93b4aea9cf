//! Teacher record and its field registry

use serde::{Deserialize, Serialize};

use crate::fields::{FieldDescriptor, FieldRegistry, FieldValue, Record, RegistryError, ValueKind};

/// A teacher as stored in the `teachers` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Teacher {
    /// Storage-assigned identifier, immutable after creation
    pub id: i64,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Contact address
    pub email: String,
    /// Class the teacher is assigned to, e.g. `9A`
    pub class: String,
    /// Subject taught
    pub subject: String,
}

/// Payload for creating or fully replacing a teacher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTeacher {
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Contact address
    pub email: String,
    /// Class the teacher is assigned to
    pub class: String,
    /// Subject taught
    pub subject: String,
}

impl NewTeacher {
    /// Attach an identifier, producing a full record
    #[must_use]
    pub fn with_id(self, id: i64) -> Teacher {
        Teacher {
            id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            class: self.class,
            subject: self.subject,
        }
    }
}

/// Addressable fields of [`Teacher`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeacherField {
    /// `id`
    Id,
    /// `first_name`
    FirstName,
    /// `last_name`
    LastName,
    /// `email`
    Email,
    /// `class`
    Class,
    /// `subject`
    Subject,
}

impl TeacherField {
    /// Every field, in registry order
    pub const ALL: [TeacherField; 6] = [
        Self::Id,
        Self::FirstName,
        Self::LastName,
        Self::Email,
        Self::Class,
        Self::Subject,
    ];

    /// External name, identical to the storage column
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::Email => "email",
            Self::Class => "class",
            Self::Subject => "subject",
        }
    }
}

impl Record for Teacher {
    type Field = TeacherField;

    const IDENTIFIER: &'static str = "id";

    fn id(&self) -> i64 {
        self.id
    }

    fn kind_of(field: TeacherField) -> ValueKind {
        match field {
            TeacherField::Id => ValueKind::Integer,
            TeacherField::FirstName
            | TeacherField::LastName
            | TeacherField::Email
            | TeacherField::Class
            | TeacherField::Subject => ValueKind::String,
        }
    }

    fn get(&self, field: TeacherField) -> FieldValue {
        match field {
            TeacherField::Id => FieldValue::Integer(self.id),
            TeacherField::FirstName => FieldValue::Text(self.first_name.clone()),
            TeacherField::LastName => FieldValue::Text(self.last_name.clone()),
            TeacherField::Email => FieldValue::Text(self.email.clone()),
            TeacherField::Class => FieldValue::Text(self.class.clone()),
            TeacherField::Subject => FieldValue::Text(self.subject.clone()),
        }
    }

    fn set(&mut self, field: TeacherField, value: FieldValue) -> Result<(), FieldValue> {
        let slot = match field {
            TeacherField::Id => {
                return match value {
                    FieldValue::Integer(id) => {
                        self.id = id;
                        Ok(())
                    }
                    other => Err(other),
                };
            }
            TeacherField::FirstName => &mut self.first_name,
            TeacherField::LastName => &mut self.last_name,
            TeacherField::Email => &mut self.email,
            TeacherField::Class => &mut self.class,
            TeacherField::Subject => &mut self.subject,
        };

        match value {
            FieldValue::Text(text) => {
                *slot = text;
                Ok(())
            }
            other => Err(other),
        }
    }
}

/// Build the registry for [`Teacher`]
///
/// The identifier is filterable and sortable but never patchable.
pub fn teacher_registry() -> Result<FieldRegistry<Teacher>, RegistryError> {
    let descriptors = TeacherField::ALL
        .iter()
        .map(|&field| {
            let descriptor = FieldDescriptor::new(field.name(), field.name(), field);
            match field {
                TeacherField::Id => descriptor.read_only(),
                _ => descriptor,
            }
        })
        .collect();

    FieldRegistry::new(descriptors)
}
