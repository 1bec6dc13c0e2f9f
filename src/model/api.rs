//! API documentation: functions, types and constant groups.

use super::{ApiFunctionId, GroupId, Model, Text};

/// The API of one group.
#[derive(Debug, Clone, Default)]
pub struct Api {
    pub functions: Vec<ApiFunctionId>,
    pub types: Vec<ApiType>,
    pub constants: Vec<ApiConstants>,
}

#[derive(Debug, Clone, Default)]
pub struct ApiFunction {
    pub name: Text,
    pub group: GroupId,
    pub return_type: Text,
    pub description: Text,
    pub action: Text,
    pub parameters: Vec<Parameter>,
    pub returns: Vec<ReturnValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameter {
    pub type_name: Text,
    pub name: Text,
    pub brief: Text,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReturnValue {
    pub value: Text,
    pub brief: Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRecordKind {
    Type,
    Record,
    Name,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRecord {
    pub kind: TypeRecordKind,
    pub type_item: Text,
    pub name_value: Text,
    pub brief: Text,
}

/// A documented structure, union or enum.
#[derive(Debug, Clone, Default)]
pub struct ApiType {
    pub name: Text,
    pub description: Text,
    pub records: Vec<TypeRecord>,
    /// Nesting of open `@record` fields while the type is being read.
    pub depth: i32,
}

impl ApiType {
    pub fn add_record(&mut self, kind: TypeRecordKind, type_item: Text, name_value: Text, brief: Text) {
        self.records.push(TypeRecord {
            kind,
            type_item,
            name_value,
            brief,
        });
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constant {
    pub type_name: Text,
    pub name: Text,
    pub value: Text,
    pub brief: Text,
    /// Declared as a typed constant rather than a `#define`.
    pub typed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ApiConstants {
    pub name: Text,
    pub description: Text,
    pub constants: Vec<Constant>,
}

impl ApiConstants {
    /// Start an empty typed constant that following records fill in.
    pub fn new_constant(&mut self) {
        self.constants.push(Constant {
            typed: true,
            ..Constant::default()
        });
    }

    /// Fill the constant opened by [`new_constant`](Self::new_constant), or
    /// add a new one when there is none waiting.
    pub fn add_typed(&mut self, type_name: Text, name: Text, brief: Text) {
        if let Some(open) = self
            .constants
            .last_mut()
            .filter(|constant| constant.typed && constant.name.is_empty())
        {
            open.type_name = type_name;
            open.name = name;
            open.brief = brief;
            return;
        }

        self.constants.push(Constant {
            type_name,
            name,
            brief,
            typed: true,
            ..Constant::default()
        });
    }

    pub fn add_define(&mut self, name: Text, value: Text) {
        self.constants.push(Constant {
            name,
            value,
            ..Constant::default()
        });
    }
}

impl Model {
    pub fn api_function(&self, id: ApiFunctionId) -> &ApiFunction {
        &self.api_functions[id.index()]
    }

    pub fn api_function_mut(&mut self, id: ApiFunctionId) -> &mut ApiFunction {
        &mut self.api_functions[id.index()]
    }

    pub fn find_api_function(&self, group: GroupId, name: &str) -> Option<ApiFunctionId> {
        let api = self.group(group).api.as_ref()?;
        api.functions
            .iter()
            .copied()
            .find(|id| self.api_function(*id).name.text == name)
    }

    pub fn add_api_function(&mut self, group: GroupId, name: &str) -> ApiFunctionId {
        let id = ApiFunctionId(self.api_functions.len() as u32);
        self.api_functions.push(ApiFunction {
            name: Text::new(name),
            group,
            ..ApiFunction::default()
        });
        self.group_mut(group).api.get_or_insert_with(Api::default).functions.push(id);
        id
    }

    pub fn api_mut(&mut self, group: GroupId) -> &mut Api {
        self.group_mut(group).api.get_or_insert_with(Api::default)
    }
}
