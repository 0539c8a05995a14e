//! A minimal internal stand-in for the ISO 11783-12 Device Descriptor Object
//! Pool parser and geometry helper. Spec treats the real parser as an
//! external collaborator out of scope for this core; this module implements
//! just enough of the object model — Device, DeviceElement,
//! DeviceProcessData, DeviceProperty, their child-object lists, and the two
//! queries the TC Server needs — to make pool activation and measurement
//! subscription independently testable (see SPEC_FULL.md §4.6, DESIGN.md).
//!
//! Binary layout (little-endian throughout), not an ISO 11783-12 wire
//! format — a compact self-describing encoding sufficient for this crate's
//! own tests and for feeding real pools converted into it upstream:
//!
//! ```text
//! header:  u8 version, u16 object_count
//! object:  u8 tag, u16 id, <tag-specific fields>
//!   tag 0 Device:          u16 designator_len, designator bytes, u16 child_count, child ids (u16 each)
//!   tag 1 DeviceElement:   u16 number, u8 element_type, u16 child_count, child ids (u16 each)
//!   tag 2 DeviceProcessData: u16 ddi, u8 trigger_methods
//!   tag 3 DeviceProperty:  u16 ddi, i32 value
//! ```

use std::collections::HashMap;

use crate::error::PoolError;

pub const TRIGGER_TIME_INTERVAL: u8 = 0x01;
pub const TRIGGER_DISTANCE_INTERVAL: u8 = 0x02;
pub const TRIGGER_THRESHOLD_LIMITS: u8 = 0x04;
pub const TRIGGER_ON_CHANGE: u8 = 0x08;
pub const TRIGGER_TOTAL_CHANGE: u8 = 0x10;

/// ISO 11783-12 element type discriminant (the subset this model needs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Device,
    Function,
    Bin,
    Section,
    Unit,
    Connector,
    Navigation,
}

impl ElementType {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Device),
            1 => Some(Self::Function),
            2 => Some(Self::Bin),
            3 => Some(Self::Section),
            4 => Some(Self::Unit),
            5 => Some(Self::Connector),
            6 => Some(Self::Navigation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DeviceObject {
    Device {
        id: u16,
        designator: String,
        children: Vec<u16>,
    },
    DeviceElement {
        id: u16,
        number: u16,
        element_type: ElementType,
        children: Vec<u16>,
    },
    DeviceProcessData {
        id: u16,
        ddi: u16,
        trigger_methods: u8,
    },
    DeviceProperty {
        id: u16,
        ddi: u16,
        value: i32,
    },
}

impl DeviceObject {
    pub fn id(&self) -> u16 {
        match self {
            DeviceObject::Device { id, .. }
            | DeviceObject::DeviceElement { id, .. }
            | DeviceObject::DeviceProcessData { id, .. }
            | DeviceObject::DeviceProperty { id, .. } => *id,
        }
    }

    fn children(&self) -> &[u16] {
        match self {
            DeviceObject::Device { children, .. } => children,
            DeviceObject::DeviceElement { children, .. } => children,
            _ => &[],
        }
    }
}

/// A deserialised Device Descriptor Object Pool: a flat table of objects,
/// related to each other only by the id lists each carries.
#[derive(Debug, Clone, Default)]
pub struct Pool {
    objects: HashMap<u16, DeviceObject>,
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], PoolError> {
        if self.pos + n > self.data.len() {
            return Err(PoolError::Truncated(self.pos));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, PoolError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, PoolError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn i32(&mut self) -> Result<i32, PoolError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

impl Pool {
    /// Parse a complete pool from concatenated chunk bytes.
    pub fn parse(data: &[u8]) -> Result<Self, PoolError> {
        let mut cursor = Cursor::new(data);
        let _version = cursor.u8()?;
        let object_count = cursor.u16()?;

        let mut objects = HashMap::with_capacity(object_count as usize);
        for _ in 0..object_count {
            let tag = cursor.u8()?;
            let id = cursor.u16()?;
            let object = match tag {
                0 => {
                    let len = cursor.u16()? as usize;
                    let bytes = cursor.take(len)?;
                    let designator = String::from_utf8_lossy(bytes).into_owned();
                    let children = Self::read_children(&mut cursor)?;
                    DeviceObject::Device { id, designator, children }
                }
                1 => {
                    let number = cursor.u16()?;
                    let element_type_raw = cursor.u8()?;
                    let element_type = ElementType::from_u8(element_type_raw)
                        .ok_or(PoolError::UnknownObjectType(element_type_raw))?;
                    let children = Self::read_children(&mut cursor)?;
                    DeviceObject::DeviceElement { id, number, element_type, children }
                }
                2 => {
                    let ddi = cursor.u16()?;
                    let trigger_methods = cursor.u8()?;
                    DeviceObject::DeviceProcessData { id, ddi, trigger_methods }
                }
                3 => {
                    let ddi = cursor.u16()?;
                    let value = cursor.i32()?;
                    DeviceObject::DeviceProperty { id, ddi, value }
                }
                other => return Err(PoolError::UnknownObjectType(other)),
            };
            objects.insert(id, object);
        }
        Ok(Pool { objects })
    }

    fn read_children(cursor: &mut Cursor<'_>) -> Result<Vec<u16>, PoolError> {
        let count = cursor.u16()?;
        let mut children = Vec::with_capacity(count as usize);
        for _ in 0..count {
            children.push(cursor.u16()?);
        }
        Ok(children)
    }

    /// Number of `DeviceElement`s of type `Section`, bounded to [0, 256] per
    /// spec §3. Excess sections are dropped with a warning by the caller,
    /// not by this query.
    pub fn count_sections(&self) -> usize {
        self.objects
            .values()
            .filter(|o| matches!(o, DeviceObject::DeviceElement { element_type: ElementType::Section, .. }))
            .count()
    }

    /// All `DeviceProcessData` objects advertising the given DDI.
    pub fn process_data_with_ddi(&self, ddi: u16) -> impl Iterator<Item = (&DeviceObject, u8)> {
        self.objects.values().filter_map(move |o| match o {
            DeviceObject::DeviceProcessData { ddi: d, trigger_methods, .. } if *d == ddi => {
                Some((o, *trigger_methods))
            }
            _ => None,
        })
    }

    /// The `DeviceElement`s whose child list contains `object_id`.
    pub fn elements_containing(&self, object_id: u16) -> impl Iterator<Item = &DeviceObject> {
        self.objects.values().filter(move |o| {
            matches!(o, DeviceObject::DeviceElement { .. }) && o.children().contains(&object_id)
        })
    }

    pub fn element_number(object: &DeviceObject) -> Option<u16> {
        match object {
            DeviceObject::DeviceElement { number, .. } => Some(*number),
            _ => None,
        }
    }
}

#[cfg(test)]
pub mod test_fixtures {
    //! Hand-built pool bytes for tests: one boom (element 5) with three
    //! sections at element numbers 10, 11, 12, plus the process-data
    //! objects the TC server subscribes to.
    use super::*;

    pub fn three_section_pool_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(1); // version

        // object ids:
        // 1 = Device, 2 = boom element (number=5), 3 = section 10, 4 = section 11,
        // 5 = section 12, 6 = ActualCondensedWorkState1_16 process data,
        // 7 = SectionControlState process data, 8 = SetpointCondensedWorkState1_16
        // process data, 9 = SetpointWorkState process data
        let object_count: u16 = 9;
        buf.extend_from_slice(&object_count.to_le_bytes());

        // Device
        buf.push(0);
        buf.extend_from_slice(&1u16.to_le_bytes());
        let designator = b"Sprayer";
        buf.extend_from_slice(&(designator.len() as u16).to_le_bytes());
        buf.extend_from_slice(designator);
        buf.extend_from_slice(&1u16.to_le_bytes()); // 1 child
        buf.extend_from_slice(&2u16.to_le_bytes());

        // Boom DeviceElement id=2, number=5, type=Function(1), children = [3,4,5,6,7,8,9]
        buf.push(1);
        buf.extend_from_slice(&2u16.to_le_bytes());
        buf.extend_from_slice(&5u16.to_le_bytes()); // element number
        buf.push(1); // Function
        buf.extend_from_slice(&7u16.to_le_bytes());
        for child in [3u16, 4, 5, 6, 7, 8, 9] {
            buf.extend_from_slice(&child.to_le_bytes());
        }

        // Three section elements, numbers 10, 11, 12, no children
        for (id, number) in [(3u16, 10u16), (4, 11), (5, 12)] {
            buf.push(1);
            buf.extend_from_slice(&id.to_le_bytes());
            buf.extend_from_slice(&number.to_le_bytes());
            buf.push(3); // Section
            buf.extend_from_slice(&0u16.to_le_bytes());
        }

        // DeviceProcessData id=6: ActualCondensedWorkState1_16, OnChange trigger
        buf.push(2);
        buf.extend_from_slice(&6u16.to_le_bytes());
        buf.extend_from_slice(&crate::ddi::ACTUAL_CONDENSED_WORK_STATE_BASE.to_le_bytes());
        buf.push(crate::ddop::TRIGGER_ON_CHANGE);

        // DeviceProcessData id=7: SectionControlState, OnChange trigger
        buf.push(2);
        buf.extend_from_slice(&7u16.to_le_bytes());
        buf.extend_from_slice(&crate::ddi::SECTION_CONTROL_STATE.to_le_bytes());
        buf.push(crate::ddop::TRIGGER_ON_CHANGE);

        // DeviceProcessData id=8: SetpointCondensedWorkState1_16, OnChange trigger
        buf.push(2);
        buf.extend_from_slice(&8u16.to_le_bytes());
        buf.extend_from_slice(&crate::ddi::SETPOINT_CONDENSED_WORK_STATE_BASE.to_le_bytes());
        buf.push(crate::ddop::TRIGGER_ON_CHANGE);

        // DeviceProcessData id=9: SetpointWorkState, OnChange trigger
        buf.push(2);
        buf.extend_from_slice(&9u16.to_le_bytes());
        buf.extend_from_slice(&crate::ddi::SETPOINT_WORK_STATE.to_le_bytes());
        buf.push(crate::ddop::TRIGGER_ON_CHANGE);

        buf
    }
}
