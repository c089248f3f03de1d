//! Human resources: employees, employment contracts and leave requests.
//!
//! Employees, contracts and leave requests are event-sourced aggregates; job
//! positions and leave types are plain reference records.

pub mod contract;
pub mod employee;
pub mod leave;
pub mod reference;

pub use contract::{
    ActivateContract, CONTRACT_AGGREGATE, Contract, ContractActivated, ContractCommand,
    ContractDrafted, ContractEnded, ContractEvent, ContractId, ContractStatus, ContractTerms,
    ContractType, DraftContract, EndContract,
};
pub use employee::{
    EMPLOYEE_AGGREGATE, Employee, EmployeeCommand, EmployeeEvent, EmployeeHired, EmployeeId,
    EmployeeProfile, EmployeeStatus, EmployeeTerminated, EmployeeUpdated, HireEmployee,
    TerminateEmployee, UpdateEmployee,
};
pub use leave::{
    CreateLeaveRequest, DecideLeaveRequest, LEAVE_REQUEST_AGGREGATE, LeavePeriod, LeaveRequest,
    LeaveRequestCommand, LeaveRequestCreated, LeaveRequestDecided, LeaveRequestEvent,
    LeaveRequestId, LeaveRequestSubmitted, LeaveRequestUpdated, LeaveStatus, SubmitLeaveRequest,
    UpdateLeaveRequest, working_half_days,
};
pub use reference::{JobPosition, LeaveType, default_leave_types};
